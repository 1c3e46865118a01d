//! In-process source fed through an mpsc sender.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::source::{ConfigSource, Snapshot, SourceError, SUBSCRIPTION_BUFFER};

/// Source whose updates are pushed by the embedding program.
///
/// `get` returns the most recent snapshot that passed through the
/// subscription (or the initial one). Only one subscription is allowed.
pub struct ChannelSource {
    current: Arc<Mutex<Snapshot>>,
    updates: Mutex<Option<mpsc::Receiver<Snapshot>>>,
}

impl ChannelSource {
    /// Create the source and the sender used to publish new snapshots.
    pub fn new(initial: Snapshot) -> (Self, mpsc::Sender<Snapshot>) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let source = Self {
            current: Arc::new(Mutex::new(initial)),
            updates: Mutex::new(Some(rx)),
        };
        (source, tx)
    }
}

#[async_trait]
impl ConfigSource for ChannelSource {
    async fn get(&self) -> Result<Snapshot, SourceError> {
        Ok(self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    async fn subscribe(
        &self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<mpsc::Receiver<Snapshot>, SourceError> {
        let mut inbound = self
            .updates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(SourceError::AlreadySubscribed)?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let current = Arc::clone(&self.current);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    next = inbound.recv() => {
                        let Some(snapshot) = next else { break };
                        *current.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot.clone();
                        if tx.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });

        Ok(rx)
    }

    fn describe(&self) -> String {
        "in-process channel".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forwards_until_shutdown() {
        let initial: Snapshot = [("a.conf", "x=1")].into_iter().collect();
        let (source, publisher) = ChannelSource::new(initial.clone());
        assert_eq!(source.get().await.unwrap(), initial);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut updates = source.subscribe(shutdown_rx).await.unwrap();

        let next: Snapshot = [("b.conf", "y=2")].into_iter().collect();
        publisher.send(next.clone()).await.unwrap();
        assert_eq!(updates.recv().await, Some(next.clone()));
        assert_eq!(source.get().await.unwrap(), next);

        shutdown_tx.send(()).unwrap();
        assert_eq!(updates.recv().await, None);
    }

    #[tokio::test]
    async fn test_single_subscription() {
        let (source, _publisher) = ChannelSource::new(Snapshot::new());
        let (_tx, rx1) = broadcast::channel(1);
        let rx2 = _tx.subscribe();
        let _first = source.subscribe(rx1).await.unwrap();
        assert!(matches!(
            source.subscribe(rx2).await,
            Err(SourceError::AlreadySubscribed)
        ));
    }
}
