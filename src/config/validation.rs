//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rate >= 1/day, burst >= 1, multiplier >= 1, retry budget > 0)
//! - Check that the selected trigger is usable (absolute URL, known method, command set)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SidecarConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use reqwest::Method;
use thiserror::Error;
use url::Url;

use crate::config::schema::{SidecarConfig, SourceConfig, TriggerConfig};

/// Slowest accepted refill rate: one reconciliation per day.
pub const MIN_REFILL_PER_SECOND: f64 = 1.0 / 86_400.0;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("ConfigMap name must be specified")]
    MissingResourceName,

    #[error("namespace must not be empty")]
    MissingNamespace,

    #[error("configuration root directory must be specified")]
    MissingRootDir,

    #[error("rate limit refill must be at least one token per day, got {0}")]
    InvalidRefillRate(f64),

    #[error("rate limit burst must be at least 1")]
    ZeroBurst,

    #[error("reload URL {url:?} is not a valid absolute URL: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    #[error("application command line required")]
    MissingCommand,

    #[error("backoff multiplier must be >= 1.0, got {0}")]
    InvalidMultiplier(f64),

    #[error("backoff randomization factor must be within [0, 1], got {0}")]
    InvalidRandomization(f64),

    #[error("HTTP retry budget must be positive")]
    ZeroRetryBudget,

    #[error("poll interval must be at least one second")]
    ZeroPollInterval,
}

/// Validate the whole configuration, collecting every problem found.
pub fn validate_config(config: &SidecarConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.resource.name.is_empty() {
        errors.push(ValidationError::MissingResourceName);
    }
    if config.resource.namespace.is_empty() {
        errors.push(ValidationError::MissingNamespace);
    }
    if config.root_dir.as_os_str().is_empty() {
        errors.push(ValidationError::MissingRootDir);
    }

    let rate = config.rate_limit.refill_per_second;
    if !(rate.is_finite() && rate >= MIN_REFILL_PER_SECOND) {
        errors.push(ValidationError::InvalidRefillRate(rate));
    }
    if config.rate_limit.burst == 0 {
        errors.push(ValidationError::ZeroBurst);
    }

    match &config.trigger {
        TriggerConfig::Http { url, method } => {
            match Url::parse(url) {
                Ok(parsed) if parsed.cannot_be_a_base() => errors.push(ValidationError::InvalidUrl {
                    url: url.clone(),
                    reason: "not a hierarchical URL".into(),
                }),
                Ok(_) => {}
                Err(e) => errors.push(ValidationError::InvalidUrl {
                    url: url.clone(),
                    reason: e.to_string(),
                }),
            }
            if method.is_empty() || Method::from_bytes(method.as_bytes()).is_err() {
                errors.push(ValidationError::InvalidMethod(method.clone()));
            }
        }
        TriggerConfig::Process { command, .. } => {
            if command.is_empty() {
                errors.push(ValidationError::MissingCommand);
            }
        }
    }

    let multiplier = config.http_retry.multiplier;
    if !(multiplier.is_finite() && multiplier >= 1.0) {
        errors.push(ValidationError::InvalidMultiplier(multiplier));
    }
    if config.http_retry.max_elapsed_ms == 0 {
        errors.push(ValidationError::ZeroRetryBudget);
    }
    let jitter = config.http_retry.randomization_factor;
    if !(0.0..=1.0).contains(&jitter) {
        errors.push(ValidationError::InvalidRandomization(jitter));
    }

    if let SourceConfig::Kubernetes { poll_interval_secs: 0, .. } = config.source {
        errors.push(ValidationError::ZeroPollInterval);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
