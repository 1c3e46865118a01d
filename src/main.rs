//! ConfigMap Reloader
//!
//! A sidecar that mirrors a ConfigMap into a directory and tells the
//! workload to reload whenever it changes.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────┐   Snapshot    ┌─────────────────────────────────────────────┐
//!   │ API server / │──────────────▶│                Coordinator                   │
//!   │  local file  │  (deduped,    │                                              │
//!   └──────────────┘   coalesced)  │  ┌────────────┐  ┌─────────────┐  ┌────────┐ │
//!                                  │  │ RateLimiter│─▶│ Materializer│─▶│ Reload │ │
//!                                  │  │ (token     │  │ (delete old,│  │ Trigger│ │
//!                                  │  │  bucket)   │  │  write new) │  └───┬────┘ │
//!                                  │  └────────────┘  └──────┬──────┘      │      │
//!                                  └─────────────────────────┼─────────────┼──────┘
//!                                                            ▼             │
//!                                                      config root dir     │
//!                                                                          ▼
//!                                              SIGHUP to child  or  POST /-/reload
//! ```
//!
//! # Exit Codes
//! - 0: clean shutdown after SIGTERM/SIGINT
//! - 1: shutdown ran into an error
//! - 2: startup failed (bad config, unreachable source, initial sync failed,
//!   child could not be spawned)
//! - 3: fatal run-time error (supervised process exited on its own)

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::oneshot;

use configmap_reloader::config::cli::Cli;
use configmap_reloader::coordinator::{Coordinator, RunError};
use configmap_reloader::lifecycle::signals::wait_for_termination;
use configmap_reloader::observability::{logging, metrics};

const EXIT_SHUTDOWN_ERROR: u8 = 1;
const EXIT_STARTUP_FAILURE: u8 = 2;
const EXIT_FATAL: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configmap-reloader: {}", e);
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    logging::init(&config.observability);
    tracing::info!("configmap-reloader v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        resource = %config.resource,
        root = %config.root_dir.display(),
        refill_per_second = config.rate_limit.refill_per_second,
        burst = config.rate_limit.burst,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let coordinator = match Coordinator::from_config(config).await {
        Ok(coordinator) => coordinator,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    let (stopped_tx, stopped_rx) = oneshot::channel();
    let stopper = Arc::clone(&coordinator);
    tokio::spawn(async move {
        match wait_for_termination().await {
            Ok(signal) => tracing::info!("Received {}, shutting down", signal),
            Err(e) => tracing::error!(error = %e, "Signal handling failed, shutting down"),
        }
        let clean = match stopper.stop() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Error during shutdown");
                false
            }
        };
        let _ = stopped_tx.send(clean);
    });

    match coordinator.run().await {
        Ok(()) => {
            let clean = stopped_rx.await.unwrap_or(true);
            let code = if clean { 0 } else { EXIT_SHUTDOWN_ERROR };
            tracing::info!("Exiting with {}", code);
            ExitCode::from(code)
        }
        Err(e @ RunError::Start(_)) => {
            tracing::error!("{}", e);
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}
