//! Reconciliation coordinator.
//!
//! # Data Flow
//! ```text
//! initialize():
//!     create root dir → source.get() → reconcile (fatal on error)
//!
//! run():
//!     [process trigger] start child ──────────────┐
//!     source.subscribe() → watch loop             │ ChildExit
//!         → coalesce queued snapshots             │
//!         → skip if equal to last observed        ▼
//!         → on_snapshot_changed()          select { shutdown, child exit }
//!             lock ─▶ rate limit ─▶ sync ─▶ reload
//!
//! stop():
//!     stopping flag + broadcast → watch loop ends → child SIGKILLed → reaped
//! ```
//!
//! # Design Decisions
//! - One async mutex covers the rate limiter and the materializer
//! - Steady-state failures are logged and dropped; the next change retries
//! - Unexpected child exits end `run()` with an error

pub mod reconciler;
pub mod types;

pub use reconciler::Coordinator;
pub use types::{ReconcileError, RunError, SetupError};
