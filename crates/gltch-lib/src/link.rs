//! Controller-side connection watcher.
//!
//! Owns the link state. On a disconnect it clears the indicator ring exactly
//! once per episode; repeated disconnect signals while already cleared are
//! ignored. Other contexts only see a read-only [`LinkSnapshot`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::led::{Color, ColorQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// `clear_pending` is true once the clear color for this episode was sent.
    Disconnected { clear_pending: bool },
    Connected,
}

/// Read-only view of whether the link is up.
#[derive(Debug, Clone, Default)]
pub struct LinkSnapshot {
    connected: Arc<AtomicBool>,
}

impl LinkSnapshot {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub struct ConnectionWatcher {
    state: LinkState,
    queue: ColorQueue,
    published: Arc<AtomicBool>,
}

impl ConnectionWatcher {
    pub fn new(queue: ColorQueue) -> Self {
        ConnectionWatcher {
            state: LinkState::Disconnected {
                clear_pending: false,
            },
            queue,
            published: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            connected: Arc::clone(&self.published),
        }
    }

    pub fn link_up(&mut self) {
        log::info!("[link] connected");
        self.state = LinkState::Connected;
        self.published.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if a clear color was enqueued.
    pub fn link_down(&mut self) -> bool {
        self.published.store(false, Ordering::SeqCst);
        match self.state {
            LinkState::Disconnected {
                clear_pending: true,
            } => {
                log::debug!("[link] spurious disconnect ignored");
                false
            }
            LinkState::Connected
            | LinkState::Disconnected {
                clear_pending: false,
            } => {
                log::info!("[link] disconnected, clearing indicator");
                let sent = match self.queue.push(Color::BLACK) {
                    Ok(()) => true,
                    Err(e) => {
                        log::warn!("[link] {e}");
                        false
                    }
                };
                self.state = LinkState::Disconnected {
                    clear_pending: true,
                };
                sent
            }
        }
    }

    /// Feed a raw transport connect/disconnect callback.
    pub fn on_connect_event(&mut self, connected: bool) {
        if connected {
            self.link_up();
        } else {
            self.link_down();
        }
    }
}
