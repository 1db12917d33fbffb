//! Companion event loop driving one mute episode.
//!
//! The loop is the only context that touches the [`MuteEpisode`]. Mute
//! triggers reach it through a zero-capacity channel: the notifier blocks
//! until the loop is ready, so at most one trigger is ever in flight and a
//! second press during processing is absorbed by the blocked call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::{Duration, Instant};

use crate::audio::InputVolume;
use crate::episode::{EpisodeEvent, MuteEpisode};
use crate::protocol::{self, CMD_ENTER_STANDBY, CMD_MUTE_REQUEST};
use crate::transport::{FrameSink, send_logged};

/// Granularity for interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Stand-in deadline distance when `now + d` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86_400);

/// `from + d`, clamped to a day ahead (or `from`) if the sum overflows.
pub(crate) fn deadline_after(from: Instant, d: Duration) -> Instant {
    from.checked_add(d)
        .or_else(|| from.checked_add(FAR_FUTURE))
        .unwrap_or(from)
}

/// Sending half of the trigger rendezvous.
#[derive(Debug, Clone)]
pub struct TriggerNotifier {
    tx: SyncSender<()>,
}

impl TriggerNotifier {
    /// Hand a trigger to the loop, blocking until it is received.
    ///
    /// Returns `false` if the loop has exited.
    pub fn notify(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

pub fn trigger_channel() -> (TriggerNotifier, Receiver<()>) {
    let (tx, rx) = mpsc::sync_channel(0);
    (TriggerNotifier { tx }, rx)
}

/// Whether a notification payload from the controller is a mute request.
pub fn is_mute_request(payload: &[u8]) -> bool {
    match protocol::decode(payload) {
        Ok(frame) if frame.to_bytes() == CMD_MUTE_REQUEST => true,
        Ok(frame) => {
            log::warn!("[link] ignoring notification {frame}");
            false
        }
        Err(e) => {
            log::warn!("[link] {e}");
            false
        }
    }
}

/// Sleep for `total`, returning early (with `false`) if `running` clears.
fn sleep_while_running(total: Duration, running: &AtomicBool) -> bool {
    let deadline = deadline_after(Instant::now(), total);
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        std::thread::sleep(left.min(SLEEP_SLICE));
    }
}

/// Run the companion loop until `running` clears or every notifier is dropped.
///
/// After the startup grace delay one `enter-standby` frame is sent,
/// unconditionally; only then do ticks and triggers start being processed.
/// `on_event` observes every frame-emitting transition (hooks, console output).
pub fn run(
    episode: &mut MuteEpisode,
    volume: &impl InputVolume,
    sink: &impl FrameSink,
    triggers: &Receiver<()>,
    running: &AtomicBool,
    mut on_event: impl FnMut(EpisodeEvent),
) {
    let tick = episode.settings().tick.max(Duration::from_millis(1));

    if !sleep_while_running(episode.settings().startup_grace, running) {
        return;
    }
    log::info!("[mute] startup standby");
    send_logged(sink, CMD_ENTER_STANDBY);

    let mut next_tick = deadline_after(Instant::now(), tick);
    while running.load(Ordering::SeqCst) {
        let wait = next_tick.saturating_duration_since(Instant::now());
        let event = match triggers.recv_timeout(wait) {
            Ok(()) => {
                log::debug!("[mute] trigger received");
                episode.on_trigger(Instant::now(), volume, sink)
            }
            Err(RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                next_tick = deadline_after(next_tick, tick);
                // Missed ticks are dropped rather than replayed.
                if next_tick <= now {
                    next_tick = deadline_after(now, tick);
                }
                episode.on_tick(now, volume, sink)
            }
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("[mute] trigger source closed");
                break;
            }
        };
        if let Some(ev) = event {
            on_event(ev);
        }
    }
}
