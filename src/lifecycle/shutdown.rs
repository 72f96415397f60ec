//! Shutdown coordination for the gateway.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

/// Fans one shutdown signal out to the server and any background tasks.
pub struct Shutdown {
    notify: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self {
            notify,
            triggered: AtomicBool::new(false),
        }
    }

    /// A receiver that resolves once [`Shutdown::trigger`] is called.
    /// Subscribe before triggering; later subscribers see nothing.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify.subscribe()
    }

    /// Notify every subscriber. Returns `false` if shutdown was already
    /// under way.
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::AcqRel) {
            return false;
        }
        let receivers = self.notify.send(()).unwrap_or(0);
        tracing::debug!(receivers, "Shutdown triggered");
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Subscribers that have not yet dropped their receiver.
    pub fn receiver_count(&self) -> usize {
        self.notify.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
