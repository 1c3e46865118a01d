//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the sidecar.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the reloader sidecar.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct SidecarConfig {
    /// The ConfigMap to mirror.
    pub resource: ResourceConfig,

    /// Directory the ConfigMap entries are written into.
    pub root_dir: PathBuf,

    /// How the workload is told to reload.
    pub trigger: TriggerConfig,

    /// Reconciliation throttling.
    pub rate_limit: RateLimitConfig,

    /// Backoff policy for HTTP reload requests.
    pub http_retry: HttpRetryConfig,

    /// Where snapshots come from.
    pub source: SourceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Namespaced name of the watched ConfigMap.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResourceConfig {
    pub namespace: String,
    pub name: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            name: String::new(),
        }
    }
}

impl ResourceConfig {
    /// Parse `name` or `namespace/name`. A bare name lives in `default`.
    pub fn parse_qualified(input: &str) -> Result<Self, String> {
        let parts: Vec<&str> = input.split('/').collect();
        match parts.as_slice() {
            [name] => Ok(Self {
                namespace: "default".to_string(),
                name: (*name).to_string(),
            }),
            [namespace, name] => Ok(Self {
                namespace: (*namespace).to_string(),
                name: (*name).to_string(),
            }),
            _ => Err(format!("expected qualified name, found {:?}", input)),
        }
    }
}

impl std::fmt::Display for ResourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reload trigger selection. Exactly one variant is active for the process lifetime.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Send an HTTP request to a reload endpoint.
    Http {
        url: String,
        #[serde(default = "default_http_method")]
        method: String,
    },
    /// Supervise a child process and SIGHUP it on change.
    Process {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig::Process {
            command: String::new(),
            args: Vec::new(),
        }
    }
}

pub fn default_http_method() -> String {
    "POST".to_string()
}

/// Token bucket parameters for reconciliation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Tokens added per second.
    pub refill_per_second: f64,

    /// Bucket capacity (at least 1).
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            refill_per_second: 0.1,
            burst: 1,
        }
    }
}

/// Exponential backoff settings for the HTTP notifier.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HttpRetryConfig {
    /// First retry interval in milliseconds.
    pub initial_interval_ms: u64,

    /// Growth factor applied after each attempt.
    pub multiplier: f64,

    /// Jitter as a fraction of the current interval (0.5 = ±50%).
    pub randomization_factor: f64,

    /// Upper bound for a single interval in milliseconds.
    pub max_interval_ms: u64,

    /// Total budget across all attempts in milliseconds.
    pub max_elapsed_ms: u64,

    /// Timeout of a single request in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 500,
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval_ms: 60_000,
            max_elapsed_ms: 10_000,
            request_timeout_ms: 5_000,
        }
    }
}

impl HttpRetryConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Snapshot source selection.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Kubernetes API server.
    Kubernetes {
        /// Use the pod's service account and the in-cluster API endpoint.
        #[serde(default = "default_in_cluster")]
        in_cluster: bool,

        /// API server base URL when not running in cluster.
        #[serde(default = "default_api_server")]
        api_server: String,

        /// Bearer token file when not running in cluster.
        #[serde(default)]
        token_file: Option<PathBuf>,

        /// Extra CA bundle (PEM) for the API server.
        #[serde(default)]
        ca_file: Option<PathBuf>,

        /// Resync period in seconds.
        #[serde(default = "default_poll_interval_secs")]
        poll_interval_secs: u64,
    },
    /// Local TOML file, watched for modifications.
    File { path: PathBuf },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Kubernetes {
            in_cluster: default_in_cluster(),
            api_server: default_api_server(),
            token_file: None,
            ca_file: None,
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_in_cluster() -> bool {
    true
}

pub fn default_api_server() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_poll_interval_secs() -> u64 {
    30
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Output format: `pretty` or `json`.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml() {
        let config: SidecarConfig = toml::from_str(
            r#"
            root_dir = "/etc/app"

            [resource]
            name = "app-config"

            [trigger]
            kind = "http"
            url = "http://localhost:9090/-/reload"
            "#,
        )
        .unwrap();

        assert_eq!(config.resource.namespace, "default");
        assert_eq!(config.resource.name, "app-config");
        assert_eq!(
            config.trigger,
            TriggerConfig::Http {
                url: "http://localhost:9090/-/reload".into(),
                method: "POST".into(),
            }
        );
        assert_eq!(config.rate_limit, RateLimitConfig::default());
        assert_eq!(config.http_retry.max_elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_qualified_name() {
        let bare = ResourceConfig::parse_qualified("app-config").unwrap();
        assert_eq!(bare.namespace, "default");
        assert_eq!(bare.name, "app-config");

        let full = ResourceConfig::parse_qualified("monitoring/prom").unwrap();
        assert_eq!(full.namespace, "monitoring");
        assert_eq!(full.name, "prom");

        assert!(ResourceConfig::parse_qualified("a/b/c").is_err());
    }

    #[test]
    fn test_file_source_toml() {
        let config: SidecarConfig = toml::from_str(
            r#"
            [source]
            kind = "file"
            path = "./snapshot.toml"

            [trigger]
            kind = "process"
            command = "nginx"
            args = ["-g", "daemon off;"]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.source,
            SourceConfig::File {
                path: PathBuf::from("./snapshot.toml")
            }
        );
        match config.trigger {
            TriggerConfig::Process { command, args } => {
                assert_eq!(command, "nginx");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected trigger {:?}", other),
        }
    }
}
