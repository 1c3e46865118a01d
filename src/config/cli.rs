//! Command-line surface.
//!
//! Flags override values read from the optional `--config` TOML file. The
//! reload trigger is picked by what is present: `--url` selects HTTP, a
//! trailing `-- command args...` selects process supervision.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{finalize, read_config, ConfigError};
use crate::config::schema::{
    default_api_server, default_http_method, LogFormat, ResourceConfig, SidecarConfig,
    SourceConfig, TriggerConfig,
};

#[derive(Debug, Parser)]
#[command(name = "configmap-reloader")]
#[command(about = "Mirror a ConfigMap into a directory and tell the workload to reload", long_about = None)]
pub struct Cli {
    /// TOML configuration file; flags override its values.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// ConfigMap to watch, as NAME or NAMESPACE/NAME.
    #[arg(long, value_name = "[NAMESPACE/]NAME")]
    pub configmap: Option<String>,

    /// Namespace of the ConfigMap (overrides the qualified name).
    #[arg(long)]
    pub namespace: Option<String>,

    /// Location where the ConfigMap will be written.
    #[arg(long = "configroot", value_name = "DIR")]
    pub config_root: Option<PathBuf>,

    /// Reload endpoint; selects the HTTP trigger.
    #[arg(long, conflicts_with = "command")]
    pub url: Option<String>,

    /// HTTP method for the reload request.
    #[arg(long, requires = "url")]
    pub method: Option<String>,

    /// Use the pod service account to reach the API server.
    #[arg(long = "running-in-cluster", value_name = "BOOL")]
    pub running_in_cluster: Option<bool>,

    /// API server URL when running outside the cluster.
    #[arg(long)]
    pub api_server: Option<String>,

    /// Bearer token file when running outside the cluster.
    #[arg(long, value_name = "PATH")]
    pub token_file: Option<PathBuf>,

    /// Additional CA bundle for the API server.
    #[arg(long, value_name = "PATH")]
    pub ca_file: Option<PathBuf>,

    /// Resync period against the API server, in seconds.
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Read snapshots from a local TOML file instead of the API server.
    #[arg(long, value_name = "PATH")]
    pub from_file: Option<PathBuf>,

    /// Reconciliations allowed per second.
    #[arg(long)]
    pub rate: Option<f64>,

    /// Reconciliations allowed back to back.
    #[arg(long)]
    pub burst: Option<u32>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    pub log_json: bool,

    /// Serve Prometheus metrics on this address.
    #[arg(long, value_name = "ADDR")]
    pub metrics_address: Option<String>,

    /// Application command line, after `--`.
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    /// Merge flags over the file configuration and validate the result.
    pub fn into_config(self) -> Result<SidecarConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => SidecarConfig::default(),
        };

        if let Some(qualified) = &self.configmap {
            config.resource =
                ResourceConfig::parse_qualified(qualified).map_err(ConfigError::ResourceName)?;
        }
        if let Some(namespace) = self.namespace {
            config.resource.namespace = namespace;
        }
        if let Some(root) = self.config_root {
            config.root_dir = root;
        }

        if let Some(url) = self.url {
            config.trigger = TriggerConfig::Http {
                url,
                method: self.method.unwrap_or_else(default_http_method),
            };
        } else if let Some((command, args)) = self.command.split_first() {
            config.trigger = TriggerConfig::Process {
                command: command.clone(),
                args: args.to_vec(),
            };
        }

        if let Some(path) = self.from_file {
            config.source = SourceConfig::File { path };
        } else if let SourceConfig::Kubernetes {
            in_cluster,
            api_server,
            token_file,
            ca_file,
            poll_interval_secs,
        } = &mut config.source
        {
            if let Some(flag) = self.running_in_cluster {
                *in_cluster = flag;
            }
            if let Some(server) = self.api_server {
                *api_server = server;
            }
            if self.token_file.is_some() {
                *token_file = self.token_file;
            }
            if self.ca_file.is_some() {
                *ca_file = self.ca_file;
            }
            if let Some(secs) = self.poll_interval {
                *poll_interval_secs = secs;
            }
            if api_server.is_empty() {
                *api_server = default_api_server();
            }
        }

        if let Some(rate) = self.rate {
            config.rate_limit.refill_per_second = rate;
        }
        if let Some(burst) = self.burst {
            config.rate_limit.burst = burst;
        }

        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if self.log_json {
            config.observability.log_format = LogFormat::Json;
        }
        if let Some(addr) = self.metrics_address {
            config.observability.metrics_enabled = true;
            config.observability.metrics_address = addr;
        }

        finalize(config)
    }
}
