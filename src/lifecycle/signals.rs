//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM or SIGINT (Ctrl-C)
//! - Report which one arrived so the caller can stop the Coordinator

use tokio::signal;

/// Block until the process is asked to terminate.
pub async fn wait_for_termination() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        Ok(name)
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok("Ctrl-C")
    }
}
