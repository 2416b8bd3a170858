//! Pause gate
//!
//! A manual-reset async latch used to stall the session copy loop without
//! busy-waiting. Built on `tokio::sync::watch` so releases are waker-driven:
//! the thread calling `set` never runs waiter continuations inline, and
//! cancelling one parked waiter leaves the others untouched.

use crate::error::{Error, Result};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Async manual-reset latch: waiters block while reset, pass while signalled
#[derive(Debug)]
pub struct PauseGate {
    signal: watch::Sender<bool>,
}

impl PauseGate {
    /// Create a gate in the given initial state
    pub fn new(signalled: bool) -> Self {
        let (signal, _) = watch::channel(signalled);
        Self { signal }
    }

    /// Release all current and future waiters until the next `reset`
    pub fn set(&self) {
        self.signal.send_replace(true);
    }

    /// Transition to non-signalled; a no-op when already reset
    pub fn reset(&self) {
        self.signal.send_if_modified(|signalled| {
            if *signalled {
                *signalled = false;
                true
            } else {
                false
            }
        });
    }

    pub fn is_signalled(&self) -> bool {
        *self.signal.borrow()
    }

    /// Wait until the gate is signalled or the token cancels.
    ///
    /// Returns immediately when already signalled; otherwise suspends until
    /// `set` or cancellation (which yields the `Cancelled` sentinel).
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        let mut rx = self.signal.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                changed = rx.changed() => {
                    // The sender lives in self, so a closed channel means the
                    // gate was dropped mid-wait; treat it as cancellation.
                    if changed.is_err() {
                        return Err(Error::Cancelled);
                    }
                }
            }
        }
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new(true)
    }
}
