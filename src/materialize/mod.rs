//! Snapshot materialization.
//!
//! # Data Flow
//! ```text
//! Snapshot
//!     → validate keys (relative, no `..`)
//!     → delete every file written last time (missing files only warn)
//!     → write each entry to root/key, creating parents
//!     → remember the written set for the next round
//! ```
//!
//! # Known Limitation
//! Files are deleted first and then rewritten one by one, in place. A crash
//! between those steps leaves the directory partially updated; there is no
//! staging directory or atomic swap.

pub mod materializer;

pub use materializer::{Materializer, SyncError};
