//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Parse config → Build source + trigger → Initial reconciliation → Run
//!
//! Shutdown (shutdown.rs):
//!     stop() → stopping flag set → broadcast → watch loop exits
//!            → child SIGKILLed (process trigger) → reaped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Coordinator::stop()
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - An unexpected child exit is fatal; restarts are left to the orchestrator

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
