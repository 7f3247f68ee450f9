//! A shutdown broadcast usable from sync and async callers.
//!
//! Mirrors the node's `Notifier` (see `crates/consensus/tn-node/src/worker.rs`): a single owner
//! calls [`Notifier::notify`] once, and any number of subscribers created beforehand with
//! [`Notifier::subscribe`] resolve their `recv` future.

use tokio::sync::broadcast;

/// Broadcasts a single shutdown signal to every subscriber.
pub struct Notifier {
    sender: broadcast::Sender<()>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    /// Subscribe to the shutdown signal. Must be called before [`Notifier::notify`] to guarantee
    /// delivery; subscribers added afterward may miss the signal.
    pub fn subscribe(&self) -> NotifierRecv {
        NotifierRecv(self.sender.subscribe())
    }

    /// Fire the shutdown signal. Idempotent: subsequent calls are harmless no-ops once every
    /// subscriber has already observed the first one.
    pub fn notify(&mut self) {
        let _ = self.sender.send(());
    }
}

/// A subscription to a [`Notifier`].
pub struct NotifierRecv(broadcast::Receiver<()>);

impl NotifierRecv {
    /// Resolves once the owning [`Notifier`] calls `notify`, or immediately if it already has.
    pub async fn recv(mut self) {
        let _ = self.0.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_wakes_on_notify() {
        let mut notifier = Notifier::new();
        let recv = notifier.subscribe();
        notifier.notify();
        recv.recv().await;
    }

    #[tokio::test]
    async fn multiple_subscribers_all_wake() {
        let mut notifier = Notifier::new();
        let a = notifier.subscribe();
        let b = notifier.subscribe();
        notifier.notify();
        a.recv().await;
        b.recv().await;
    }
}
