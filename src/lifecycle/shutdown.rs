//! Shutdown coordination for the sidecar.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

/// Coordinator for shutdown.
///
/// Combines a sticky "stopping" flag, checked by work that must not start
/// once shutdown began, with a broadcast channel long-running tasks select on.
#[derive(Debug)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
    stopping: AtomicBool,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            stopping: AtomicBool::new(false),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    ///
    /// Returns `true` only for the call that initiated shutdown.
    pub fn trigger(&self) -> bool {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(());
        true
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_is_sticky_and_single_shot() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        assert!(!shutdown.is_stopping());

        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert!(shutdown.is_stopping());

        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
