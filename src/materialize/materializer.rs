//! Directory synchronization against a snapshot.

use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::source::Snapshot;

/// Failures while bringing the directory in line with a snapshot.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("refusing to write key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("could not delete obsolete file {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not create parent directory for {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not write file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Writes snapshots under a root directory and remembers what it wrote.
#[derive(Debug)]
pub struct Materializer {
    root: PathBuf,
    written: HashSet<PathBuf>,
}

impl Materializer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            written: HashSet::new(),
        }
    }

    /// Paths written by the last successful sync.
    pub fn written(&self) -> &HashSet<PathBuf> {
        &self.written
    }

    /// Make the directory contain exactly the snapshot's files.
    ///
    /// The stored file set is only replaced once every write succeeded. On a
    /// failed write the paths that did get written are added to it, so the
    /// next sync still cleans them up.
    pub async fn sync(&mut self, snapshot: &Snapshot) -> Result<(), SyncError> {
        let targets = snapshot
            .iter()
            .map(|(key, content)| Ok((self.target_path(key)?, content)))
            .collect::<Result<Vec<_>, SyncError>>()?;

        for path in &self.written {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed obsolete file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::warn!(
                        path = %path.display(),
                        "Obsolete file unexpectedly does not exist (ignoring)"
                    );
                }
                Err(source) => {
                    return Err(SyncError::Remove {
                        path: path.clone(),
                        source,
                    })
                }
            }
        }

        let mut written = HashSet::with_capacity(targets.len());
        for (path, content) in targets {
            if let Err(e) = write_file(&path, content).await {
                self.written.extend(written);
                return Err(e);
            }
            written.insert(path);
        }

        self.written = written;
        Ok(())
    }

    fn target_path(&self, key: &str) -> Result<PathBuf, SyncError> {
        let invalid = |reason| SyncError::InvalidKey {
            key: key.to_string(),
            reason,
        };

        if key.is_empty() {
            return Err(invalid("empty key"));
        }
        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => return Err(invalid("parent directory reference")),
                Component::RootDir | Component::Prefix(_) => return Err(invalid("absolute path")),
            }
        }
        if relative.file_name().is_none() {
            return Err(invalid("no file name"));
        }
        Ok(self.root.join(relative))
    }
}

async fn write_file(path: &Path, content: &[u8]) -> Result<(), SyncError> {
    tracing::info!(path = %path.display(), bytes = content.len(), "Writing");

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| SyncError::CreateDir {
                path: path.to_path_buf(),
                source,
            })?;
    }

    tokio::fs::write(path, content)
        .await
        .map_err(|source| SyncError::Write {
            path: path.to_path_buf(),
            source,
        })
}
