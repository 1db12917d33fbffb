//! Indicator pipeline — bounded color queue and the worker that owns the bank.
//!
//! Producers (frame dispatch, link watcher) push colors into a [`ColorQueue`].
//! A single worker thread pops them in FIFO order, fills every cell of the
//! [`IndicatorBank`] with the color and issues one physical write per color.
//! The bank is never touched outside the worker.

use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::JoinHandle;

use super::Color;

/// Number of cells on the indicator ring.
pub const BANK_SIZE: usize = 10;

/// Capacity of the color queue between producers and the worker.
pub const INDICATOR_QUEUE_CAPACITY: usize = 10;

#[derive(Debug)]
pub enum DriverError {
    WriteFailed(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::WriteFailed(e) => write!(f, "Indicator write failed: {e}"),
        }
    }
}

impl std::error::Error for DriverError {}

/// Physical indicator output (WS2812 ring on the controller board).
pub trait IndicatorDriver: Send {
    fn write_bank(&mut self, colors: &[Color]) -> Result<(), DriverError>;
}

/// The ring's cell colors. All cells always hold the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorBank {
    cells: [Color; BANK_SIZE],
}

impl Default for IndicatorBank {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorBank {
    pub fn new() -> Self {
        IndicatorBank {
            cells: [Color::BLACK; BANK_SIZE],
        }
    }

    /// Set every cell to `color`.
    pub fn fill(&mut self, color: Color) {
        self.cells.fill(color);
    }

    pub fn cells(&self) -> &[Color] {
        &self.cells
    }
}

/// The queue was closed because the worker is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed(pub Color);

impl fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "indicator queue closed, dropped {}", self.0)
    }
}

impl std::error::Error for QueueClosed {}

/// Producer handle for the indicator pipeline.
///
/// `push` blocks while the queue holds [`INDICATOR_QUEUE_CAPACITY`] colors.
/// Nothing is ever dropped; the producer stalls instead.
#[derive(Debug, Clone)]
pub struct ColorQueue {
    tx: SyncSender<Color>,
}

impl ColorQueue {
    pub fn push(&self, color: Color) -> Result<(), QueueClosed> {
        match self.tx.try_send(color) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(color)) => {
                log::debug!("indicator queue full, waiting for worker");
                self.tx.send(color).map_err(|e| QueueClosed(e.0))
            }
            Err(TrySendError::Disconnected(color)) => Err(QueueClosed(color)),
        }
    }
}

/// Create a queue pair without starting a worker.
///
/// The receiver end is meant for [`run_worker`]; tests use it directly to
/// observe exactly what producers enqueued.
pub fn color_queue() -> (ColorQueue, Receiver<Color>) {
    let (tx, rx) = mpsc::sync_channel(INDICATOR_QUEUE_CAPACITY);
    (ColorQueue { tx }, rx)
}

/// Consumer loop: apply each queued color to the whole bank.
///
/// Returns the final bank once every [`ColorQueue`] has been dropped.
pub fn run_worker(rx: Receiver<Color>, mut driver: impl IndicatorDriver) -> IndicatorBank {
    let mut bank = IndicatorBank::new();
    for color in rx {
        bank.fill(color);
        if let Err(e) = driver.write_bank(bank.cells()) {
            log::warn!("[indicator] {e}");
        }
    }
    bank
}

/// Running pipeline: producer handle plus the worker thread.
pub struct IndicatorPipeline {
    queue: ColorQueue,
    worker: JoinHandle<IndicatorBank>,
}

impl IndicatorPipeline {
    /// Start the worker thread driving `driver`.
    pub fn spawn(driver: impl IndicatorDriver + 'static) -> std::io::Result<Self> {
        let (queue, rx) = color_queue();
        let worker = std::thread::Builder::new()
            .name("indicator".into())
            .spawn(move || run_worker(rx, driver))?;
        Ok(IndicatorPipeline { queue, worker })
    }

    /// A producer handle. Clone freely; the worker runs until all are dropped.
    pub fn queue(&self) -> ColorQueue {
        self.queue.clone()
    }

    /// Drop this pipeline's own producer handle and wait for the worker to
    /// drain. Other outstanding [`ColorQueue`] clones must be dropped first.
    pub fn shutdown(self) -> Option<IndicatorBank> {
        drop(self.queue);
        self.worker.join().ok()
    }
}

// ── Test double ──

/// Recording [`IndicatorDriver`] for unit and integration tests.
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records each bank write. Clones share the same log.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingDriver {
        pub writes: Arc<Mutex<Vec<Vec<Color>>>>,
        /// Number of upcoming writes that should fail.
        pub fail_next: Arc<Mutex<usize>>,
    }

    impl RecordingDriver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn writes(&self) -> Vec<Vec<Color>> {
            self.writes.lock().map(|w| w.clone()).unwrap_or_default()
        }

        pub fn fail_writes(&self, n: usize) {
            if let Ok(mut f) = self.fail_next.lock() {
                *f = n;
            }
        }
    }

    impl IndicatorDriver for RecordingDriver {
        fn write_bank(&mut self, colors: &[Color]) -> Result<(), DriverError> {
            if let Ok(mut f) = self.fail_next.lock()
                && *f > 0
            {
                *f -= 1;
                return Err(DriverError::WriteFailed("mock failure".into()));
            }
            if let Ok(mut w) = self.writes.lock() {
                w.push(colors.to_vec());
            }
            Ok(())
        }
    }
}
