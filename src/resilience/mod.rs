//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Snapshot change:
//!     → rate_limit.rs (token bucket, waits before any file work)
//!
//! HTTP reload request:
//!     → retries.rs (re-run on failure)
//!     → backoff.rs (exponential, jittered, bounded by total elapsed time)
//!
//! Source poll failure:
//!     → backoff.rs (attempt-counted, capped delay)
//! ```
//!
//! # Design Decisions
//! - Throttling happens before reconciliation, never after
//! - Retry loops are bounded by wall-clock budget, not attempt count

pub mod backoff;
pub mod rate_limit;
pub mod retries;

pub use backoff::ExponentialBackoff;
pub use rate_limit::RateLimiter;
