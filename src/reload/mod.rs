//! Reload triggers.
//!
//! # Data Flow
//! ```text
//! Coordinator (after a successful sync)
//!     → ReloadTrigger::reload()
//!         ├─ Process: SIGHUP to the supervised child (process.rs)
//!         └─ Http:    request with bounded exponential retry (http.rs)
//!
//! Child exit (process.rs wait task)
//!     → ChildExit on a oneshot channel
//!     → Coordinator::run() treats Unexpected as fatal
//! ```
//!
//! # Design Decisions
//! - Closed set of variants, chosen once from config and never swapped
//! - Only the process variant can be stopped; callers reach it through
//!   [`ReloadTrigger::supervisor`] rather than downcasting

pub mod http;
pub mod process;

use std::time::Duration;

use thiserror::Error;

use crate::config::{SidecarConfig, TriggerConfig};

pub use http::{AttemptError, HttpNotifier};
pub use process::{ChildExit, ProcessError, ProcessState, ProcessSupervisor};

/// Failure to notify the workload.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to send {signal} to pid {pid}: {source}")]
    Signal {
        pid: u32,
        signal: &'static str,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("{method} {url} did not succeed after {attempts} attempts in {elapsed:?}: {last_error}")]
    RetriesExhausted {
        method: String,
        url: String,
        attempts: u32,
        elapsed: Duration,
        #[source]
        last_error: AttemptError,
    },

    #[error("invalid reload endpoint: {0}")]
    InvalidEndpoint(String),
}

/// The mechanism used to tell the workload its files changed.
#[derive(Debug)]
pub enum ReloadTrigger {
    Process(ProcessSupervisor),
    Http(HttpNotifier),
}

impl ReloadTrigger {
    /// Build the trigger selected in the configuration.
    pub fn from_config(config: &SidecarConfig) -> Result<Self, ReloadError> {
        match &config.trigger {
            TriggerConfig::Http { url, method } => Ok(ReloadTrigger::Http(HttpNotifier::new(
                url,
                method,
                config.http_retry.clone(),
            )?)),
            TriggerConfig::Process { command, args } => Ok(ReloadTrigger::Process(
                ProcessSupervisor::new(command.clone(), args.clone()),
            )),
        }
    }

    /// Tell the workload to re-read its configuration.
    pub async fn reload(&self) -> Result<(), ReloadError> {
        let result = match self {
            ReloadTrigger::Process(supervisor) => supervisor.reload(),
            ReloadTrigger::Http(notifier) => notifier.reload().await,
        };
        crate::observability::metrics::record_reload(self.kind(), result.is_ok());
        result
    }

    /// The stoppable process supervisor, when that is the active variant.
    pub fn supervisor(&self) -> Option<&ProcessSupervisor> {
        match self {
            ReloadTrigger::Process(supervisor) => Some(supervisor),
            ReloadTrigger::Http(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ReloadTrigger::Process(_) => "process",
            ReloadTrigger::Http(_) => "http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_selects_variant() {
        let mut config = SidecarConfig::default();
        config.trigger = TriggerConfig::Http {
            url: "http://127.0.0.1:1/reload".into(),
            method: "PUT".into(),
        };
        let trigger = ReloadTrigger::from_config(&config).unwrap();
        assert_eq!(trigger.kind(), "http");
        assert!(trigger.supervisor().is_none());

        config.trigger = TriggerConfig::Process {
            command: "sleep".into(),
            args: vec!["30".into()],
        };
        let trigger = ReloadTrigger::from_config(&config).unwrap();
        assert_eq!(trigger.kind(), "process");
        assert!(trigger.supervisor().is_some());
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let mut config = SidecarConfig::default();
        config.trigger = TriggerConfig::Http {
            url: "localhost/reload".into(),
            method: "POST".into(),
        };
        assert!(matches!(
            ReloadTrigger::from_config(&config),
            Err(ReloadError::InvalidEndpoint(_))
        ));
    }
}
