//! ConfigMap reloader library.
//!
//! Mirrors one ConfigMap into a directory and tells the workload to reload,
//! either by signalling a supervised child or by calling an HTTP endpoint.

pub mod config;
pub mod coordinator;
pub mod lifecycle;
pub mod materialize;
pub mod observability;
pub mod reload;
pub mod resilience;
pub mod source;

pub use config::SidecarConfig;
pub use coordinator::Coordinator;
pub use lifecycle::Shutdown;
pub use reload::ReloadTrigger;
pub use source::{ConfigSource, Snapshot};
