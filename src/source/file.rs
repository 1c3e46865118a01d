//! Local file source for running outside a cluster.
//!
//! The file is TOML. Top-level string values and the optional `[data]` table
//! become snapshot entries:
//!
//! ```toml
//! "app.conf" = "x=1"
//!
//! [data]
//! "conf.d/extra.conf" = "y=2"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::source::{ConfigSource, Snapshot, SourceError, SUBSCRIPTION_BUFFER};

/// A snapshot source backed by a TOML file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Parse the file contents into a snapshot.
pub fn parse_snapshot(path: &Path, content: &str) -> Result<Snapshot, SourceError> {
    let table: toml::Table = toml::from_str(content).map_err(|source| SourceError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    let mut snapshot = Snapshot::new();
    for (key, value) in table {
        match value {
            toml::Value::String(s) => snapshot.insert(key, s),
            toml::Value::Table(data) if key == "data" => {
                for (name, value) in data {
                    match value {
                        toml::Value::String(s) => snapshot.insert(name, s),
                        other => {
                            return Err(SourceError::Decode {
                                key: name,
                                reason: format!("expected string, found {}", other.type_str()),
                            })
                        }
                    }
                }
            }
            other => {
                return Err(SourceError::Decode {
                    key,
                    reason: format!("expected string, found {}", other.type_str()),
                })
            }
        }
    }
    Ok(snapshot)
}

fn load(path: &Path) -> Result<Snapshot, SourceError> {
    let content = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_snapshot(path, &content)
}

#[async_trait]
impl ConfigSource for FileSource {
    async fn get(&self) -> Result<Snapshot, SourceError> {
        let path = self.path.clone();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| SourceError::Io {
                path: path.display().to_string(),
                source,
            })?;
        parse_snapshot(&path, &content)
    }

    async fn subscribe(
        &self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<mpsc::Receiver<Snapshot>, SourceError> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let file_name = self.path.file_name().map(ToOwned::to_owned);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify() || event.kind.is_create();
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(ToOwned::to_owned) == file_name);
                    if relevant && ours {
                        let _ = event_tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        // Watch the directory so editors that replace the file are still seen.
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Snapshot file watcher started");

        let path = self.path.clone();
        tokio::spawn(async move {
            // Owned here so the watcher lives as long as the subscription.
            let _watcher = watcher;
            loop {
                tokio::select! {
                    event = event_rx.recv() => {
                        if event.is_none() {
                            break;
                        }
                        match load(&path) {
                            Ok(snapshot) => {
                                if tx.send(snapshot).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::error!(path = ?path, error = %e, "Failed to reload snapshot file. Keeping current configuration.");
                            }
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
            tracing::debug!(path = ?path, "Snapshot file watcher stopped");
        });

        Ok(rx)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
