//! Coordinator error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::materialize::SyncError;
use crate::reload::{ChildExit, ProcessError, ReloadError};
use crate::source::SourceError;

/// Startup failures. The workload must never run unconfigured, so all of these are fatal.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("configuration root directory must be set")]
    MissingRoot,

    #[error("unable to create config root directory {path}: {source}")]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to get {resource}: {error}")]
    Source {
        resource: String,
        #[source]
        error: SourceError,
    },

    #[error("unable to set up reload trigger: {0}")]
    Trigger(#[from] ReloadError),

    #[error("unable to populate configuration directory: {0}")]
    InitialSync(#[source] ReconcileError),
}

/// One failed reconciliation cycle. Logged and dropped in steady state.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("unable to reload: {0}")]
    Reload(#[from] ReloadError),
}

/// Fatal errors while running.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("unable to watch {resource}: {error}")]
    Subscribe {
        resource: String,
        #[source]
        error: SourceError,
    },

    #[error("failed to set up child process: {0}")]
    Start(#[from] ProcessError),

    #[error("exiting due to process failure: {0}")]
    ProcessCrashed(ChildExit),

    #[error("lost track of the child process")]
    SupervisionLost,
}
