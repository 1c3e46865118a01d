//! Configuration sources.
//!
//! # Data Flow
//! ```text
//! Kubernetes API (kube.rs)  ─┐
//! local TOML file (file.rs) ─┼─▶ Snapshot stream (mpsc) ─▶ Coordinator watch loop
//! in-process (channel.rs)   ─┘
//! ```
//!
//! A source hands out one full snapshot on demand and a serial stream of
//! later snapshots. Streams end when the shutdown broadcast fires or the
//! receiving side is dropped. Deduplication of unchanged snapshots happens
//! downstream in the Coordinator.

pub mod channel;
pub mod file;
pub mod kube;
pub mod snapshot;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

pub use channel::ChannelSource;
pub use file::FileSource;
pub use kube::KubernetesSource;
pub use snapshot::Snapshot;

/// Capacity of the snapshot channel handed to subscribers.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 16;

/// Errors raised while reading or watching a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("configmap {0} not found")]
    NotFound(String),

    #[error("invalid content for key {key:?}: {reason}")]
    Decode { key: String, reason: String },

    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("file watch failed: {0}")]
    Watch(#[from] notify::Error),

    #[error("source was already subscribed")]
    AlreadySubscribed,

    #[error("Kubernetes client setup failed: {0}")]
    Client(String),
}

/// A provider of configuration snapshots for one named resource.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch the current snapshot.
    async fn get(&self) -> Result<Snapshot, SourceError>;

    /// Start delivering snapshots until `shutdown` fires.
    async fn subscribe(
        &self,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<mpsc::Receiver<Snapshot>, SourceError>;

    /// Human readable identity for logs.
    fn describe(&self) -> String;
}
