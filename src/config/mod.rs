//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional TOML file
//!     → loader.rs (parse & deserialize)
//!     → cli.rs (flag overrides, trigger selection)
//!     → validation.rs (semantic checks)
//!     → SidecarConfig (validated, immutable)
//!     → handed by reference to every component constructor
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no in-process config reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use schema::HttpRetryConfig;
pub use schema::RateLimitConfig;
pub use schema::ResourceConfig;
pub use schema::SidecarConfig;
pub use schema::SourceConfig;
pub use schema::TriggerConfig;
