//! Child process supervision.
//!
//! # Responsibilities
//! - Spawn the workload with inherited stdout/stderr
//! - Deliver SIGHUP on reload
//! - SIGKILL on stop, at most once
//! - Report how the child exited through a oneshot channel
//!
//! # State Machine
//! ```text
//! NotStarted ──start()──▶ Running { pid } ──exit──▶ Exited { status }
//! ```
//! An exit while the stopping flag is set is `ChildExit::Requested`;
//! anything else is `ChildExit::Unexpected` and the caller is expected to
//! fail fast.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::oneshot;

use crate::observability::metrics;
use crate::reload::ReloadError;

/// Lifecycle failures of the supervised child.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("child process failed to start: {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("child process already started")]
    AlreadyStarted,

    #[error("supervisor is stopping, refusing to start {0}")]
    Stopping(String),

    #[error("child process {0} exited before its pid could be read")]
    MissingPid(String),

    #[error("kill of pid {pid} failed: {source}")]
    Kill {
        pid: u32,
        #[source]
        source: Errno,
    },
}

/// Where the child is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running { pid: u32 },
    Exited { status: Option<ExitStatus> },
}

/// How the child ended.
#[derive(Debug)]
pub enum ChildExit {
    /// Exited after [`ProcessSupervisor::stop`].
    Requested { status: ExitStatus },
    /// Exited on its own.
    Unexpected { status: ExitStatus },
    /// Waiting on the child failed.
    WaitFailed { error: io::Error, requested: bool },
}

impl ChildExit {
    /// Whether this exit should bring the whole sidecar down.
    pub fn is_crash(&self) -> bool {
        match self {
            ChildExit::Requested { .. } => false,
            ChildExit::Unexpected { .. } => true,
            ChildExit::WaitFailed { requested, .. } => !requested,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ChildExit::Requested { .. } => "requested",
            ChildExit::Unexpected { .. } => "unexpected",
            ChildExit::WaitFailed { .. } => "wait_failed",
        }
    }
}

impl std::fmt::Display for ChildExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChildExit::Requested { status } => write!(f, "child process stopped: {}", status),
            ChildExit::Unexpected { status } if status.success() => {
                write!(f, "child process exited unexpectedly: {}", status)
            }
            ChildExit::Unexpected { status } => write!(f, "child process failed: {}", status),
            ChildExit::WaitFailed { error, .. } => {
                write!(f, "waiting on child process failed: {}", error)
            }
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: ProcessState,
    stopping: bool,
}

/// Owns one child process for the lifetime of the sidecar.
#[derive(Debug)]
pub struct ProcessSupervisor {
    command: String,
    args: Vec<String>,
    inner: Arc<Mutex<Inner>>,
}

impl ProcessSupervisor {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            inner: Arc::new(Mutex::new(Inner {
                state: ProcessState::NotStarted,
                stopping: false,
            })),
        }
    }

    pub fn state(&self) -> ProcessState {
        lock(&self.inner).state
    }

    pub fn pid(&self) -> Option<u32> {
        match self.state() {
            ProcessState::Running { pid } => Some(pid),
            _ => None,
        }
    }

    /// Spawn the child and return the channel its exit is reported on.
    pub fn start(&self) -> Result<oneshot::Receiver<ChildExit>, ProcessError> {
        let mut inner = lock(&self.inner);
        if inner.state != ProcessState::NotStarted {
            return Err(ProcessError::AlreadyStarted);
        }
        if inner.stopping {
            return Err(ProcessError::Stopping(self.command.clone()));
        }

        tracing::info!(
            command = %self.command,
            args = %self.args.join(" "),
            "Starting child process"
        );

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| {
                tracing::error!(command = %self.command, error = %source, "Child process failed to start");
                ProcessError::Spawn {
                    command: self.command.clone(),
                    source,
                }
            })?;

        // Signalling pid 0 would hit our own process group.
        let pid = match child.id() {
            Some(pid) if pid != 0 => pid,
            _ => {
                tracing::error!(command = %self.command, "Child process has no pid");
                return Err(ProcessError::MissingPid(self.command.clone()));
            }
        };
        inner.state = ProcessState::Running { pid };
        drop(inner);

        let (exit_tx, exit_rx) = oneshot::channel();
        let shared = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let waited = child.wait().await;

            let requested = {
                let mut inner = lock(&shared);
                inner.state = ProcessState::Exited {
                    status: waited.as_ref().ok().copied(),
                };
                inner.stopping
            };

            let exit = match waited {
                Ok(status) if requested => ChildExit::Requested { status },
                Ok(status) => ChildExit::Unexpected { status },
                Err(error) => ChildExit::WaitFailed { error, requested },
            };

            if exit.is_crash() {
                tracing::error!(pid, "{}", exit);
            } else {
                tracing::info!(pid, "{}", exit);
            }
            metrics::record_child_exit(exit.label());

            let _ = exit_tx.send(exit);
        });

        Ok(exit_rx)
    }

    /// Send SIGHUP to the running child. Without a live child this is a no-op.
    pub fn reload(&self) -> Result<(), ReloadError> {
        let inner = lock(&self.inner);
        let ProcessState::Running { pid } = inner.state else {
            tracing::debug!(state = ?inner.state, "No child process to reload");
            return Ok(());
        };

        tracing::info!(pid, "Sending SIGHUP to application");
        match kill(Pid::from_raw(pid as i32), Signal::SIGHUP) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => {
                tracing::warn!(pid, "Child process vanished before SIGHUP");
                Ok(())
            }
            Err(source) => Err(ReloadError::Signal {
                pid,
                signal: "SIGHUP",
                source,
            }),
        }
    }

    /// Kill the child. Only the first call has any effect.
    pub fn stop(&self) -> Result<(), ProcessError> {
        let mut inner = lock(&self.inner);
        if inner.stopping {
            return Ok(());
        }
        inner.stopping = true;

        let ProcessState::Running { pid } = inner.state else {
            return Ok(());
        };

        tracing::info!(pid, "Sending SIGKILL to child process");
        match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => {
                tracing::error!(pid, error = %source, "Kill failed");
                Err(ProcessError::Kill { pid, source })
            }
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
