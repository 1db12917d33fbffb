//! Outbound frame transport abstraction.

use std::fmt;

use crate::protocol::FRAME_LEN;

#[derive(Debug)]
pub enum TransportError {
    /// No link to write to.
    NotConnected,
    WriteFailed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotConnected => write!(f, "Link not connected"),
            TransportError::WriteFailed(e) => write!(f, "Frame write failed: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Something frames can be written to (a GATT characteristic, a test log).
pub trait FrameSink {
    fn send(&self, frame: [u8; FRAME_LEN]) -> Result<(), TransportError>;
}

impl<T: FrameSink + ?Sized> FrameSink for &T {
    fn send(&self, frame: [u8; FRAME_LEN]) -> Result<(), TransportError> {
        (**self).send(frame)
    }
}

impl<T: FrameSink + ?Sized> FrameSink for std::sync::Arc<T> {
    fn send(&self, frame: [u8; FRAME_LEN]) -> Result<(), TransportError> {
        (**self).send(frame)
    }
}

/// Fire-and-forget write. Failures are logged and otherwise ignored.
pub fn send_logged(sink: &impl FrameSink, frame: [u8; FRAME_LEN]) {
    if let Err(e) = sink.send(frame) {
        log::warn!("[link] {e} ({frame:02X?})");
    }
}

// ── Test double ──

/// Recording [`FrameSink`] for unit and integration tests.
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Default)]
    pub struct RecordingSink {
        frames: Mutex<Vec<[u8; FRAME_LEN]>>,
        /// When set, every send fails (and is not recorded).
        pub fail: AtomicBool,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn frames(&self) -> Vec<[u8; FRAME_LEN]> {
            self.frames.lock().map(|f| f.clone()).unwrap_or_default()
        }

        /// Return and clear the recorded frames.
        pub fn take(&self) -> Vec<[u8; FRAME_LEN]> {
            self.frames
                .lock()
                .map(|mut f| std::mem::take(&mut *f))
                .unwrap_or_default()
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    impl FrameSink for RecordingSink {
        fn send(&self, frame: [u8; FRAME_LEN]) -> Result<(), TransportError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::WriteFailed("mock failure".into()));
            }
            if let Ok(mut f) = self.frames.lock() {
                f.push(frame);
            }
            Ok(())
        }
    }
}
