//! Coalescing change signal
//!
//! A single-slot channel: bursts of notifications collapse into at most one
//! pending wakeup for the consumer. Notifying never blocks.

use parking_lot::RwLock;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
enum SignalState {
    #[default]
    Idle,
    Open(mpsc::Sender<()>),
    Closed,
}

/// Change signal owned by an active scope
#[derive(Debug, Default)]
pub struct ChangeSignal {
    state: RwLock<SignalState>,
}

impl ChangeSignal {
    /// Create idle signal with no subscriber
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the single consumer
    ///
    /// Returns `None` if a consumer is already attached or the signal is closed.
    pub fn subscribe(&self) -> Option<mpsc::Receiver<()>> {
        let mut state = self.state.write();
        if !matches!(*state, SignalState::Idle) {
            return None;
        }
        let (tx, rx) = mpsc::channel(1);
        *state = SignalState::Open(tx);
        Some(rx)
    }

    /// Mark changed; returns whether a new wakeup was queued
    ///
    /// A no-op when nobody listens, a wakeup is already pending, or the
    /// signal is closed.
    pub fn notify(&self) -> bool {
        match &*self.state.read() {
            SignalState::Open(tx) => tx.try_send(()).is_ok(),
            SignalState::Idle | SignalState::Closed => false,
        }
    }

    /// Close the signal; the consumer drains and stops
    pub fn close(&self) {
        *self.state.write() = SignalState::Closed;
    }

    /// Whether the signal was closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(*self.state.read(), SignalState::Closed)
    }
}
