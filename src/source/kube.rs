//! Kubernetes ConfigMap source.
//!
//! # Responsibilities
//! - Read one ConfigMap through the core/v1 REST API
//! - Merge `data` (UTF-8) and `binaryData` (base64) into a Snapshot
//! - Resync on a fixed period, skipping unchanged `resourceVersion`s
//! - Back off on API errors without ending the subscription

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use url::Url;

use crate::config::{ResourceConfig, SourceConfig};
use crate::resilience::backoff::calculate_backoff;
use crate::source::{ConfigSource, Snapshot, SourceError, SUBSCRIPTION_BUFFER};

const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Error backoff base, in milliseconds.
const ERROR_BACKOFF_BASE_MS: u64 = 1_000;

#[derive(Debug, Deserialize)]
struct ConfigMap {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    data: BTreeMap<String, String>,
    #[serde(default, rename = "binaryData")]
    binary_data: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default, rename = "resourceVersion")]
    resource_version: String,
}

impl ConfigMap {
    fn into_snapshot(self) -> Result<Snapshot, SourceError> {
        let mut snapshot = Snapshot::new();
        for (key, value) in self.data {
            snapshot.insert(key, value);
        }
        for (key, encoded) in self.binary_data {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| SourceError::Decode {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            snapshot.insert(key, decoded);
        }
        Ok(snapshot)
    }
}

/// Polls the API server for a single ConfigMap.
#[derive(Clone)]
pub struct KubernetesSource {
    client: reqwest::Client,
    url: Url,
    resource: ResourceConfig,
    token_file: Option<PathBuf>,
    poll_interval: Duration,
}

impl KubernetesSource {
    /// Build a source against an explicit API server.
    pub fn new(
        api_server: &str,
        resource: ResourceConfig,
        token_file: Option<PathBuf>,
        poll_interval: Duration,
    ) -> Result<Self, SourceError> {
        Self::with_client(api_server, resource, token_file, None, poll_interval)
    }

    /// Build a source from the `source` section of the configuration.
    pub fn from_config(resource: &ResourceConfig, config: &SourceConfig) -> Result<Self, SourceError> {
        let SourceConfig::Kubernetes {
            in_cluster,
            api_server,
            token_file,
            ca_file,
            poll_interval_secs,
        } = config
        else {
            return Err(SourceError::Client("not a Kubernetes source".into()));
        };
        let poll_interval = Duration::from_secs(*poll_interval_secs);

        if *in_cluster {
            let host = std::env::var("KUBERNETES_SERVICE_HOST")
                .map_err(|_| SourceError::Client("KUBERNETES_SERVICE_HOST is not set".into()))?;
            let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
            let host = if host.contains(':') { format!("[{}]", host) } else { host };
            let server = format!("https://{}:{}", host, port);
            let ca = ca_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(SERVICE_ACCOUNT_CA));

            tracing::info!(api_server = %server, "Using in-cluster Kubernetes configuration");
            Self::with_client(
                &server,
                resource.clone(),
                Some(token_file.clone().unwrap_or_else(|| PathBuf::from(SERVICE_ACCOUNT_TOKEN))),
                Some(ca.as_path()),
                poll_interval,
            )
        } else {
            Self::with_client(
                api_server,
                resource.clone(),
                token_file.clone(),
                ca_file.as_deref(),
                poll_interval,
            )
        }
    }

    fn with_client(
        api_server: &str,
        resource: ResourceConfig,
        token_file: Option<PathBuf>,
        ca_file: Option<&Path>,
        poll_interval: Duration,
    ) -> Result<Self, SourceError> {
        let base = Url::parse(api_server)
            .map_err(|e| SourceError::Client(format!("invalid API server {:?}: {}", api_server, e)))?;
        let url = base
            .join(&format!(
                "api/v1/namespaces/{}/configmaps/{}",
                resource.namespace, resource.name
            ))
            .map_err(|e| SourceError::Client(e.to_string()))?;

        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(30));
        if let Some(path) = ca_file {
            let pem = std::fs::read(path).map_err(|source| SourceError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| SourceError::Client(format!("invalid CA bundle {}: {}", path.display(), e)))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| SourceError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url,
            resource,
            token_file,
            poll_interval,
        })
    }

    async fn fetch(&self) -> Result<ConfigMap, SourceError> {
        let mut request = self.client.get(self.url.clone());

        // Projected service account tokens rotate, so read on every request.
        if let Some(path) = &self.token_file {
            let token = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| SourceError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
            request = request.bearer_auth(token.trim());
        }

        let response = request.send().await.map_err(|source| SourceError::Http {
            url: self.url.to_string(),
            source,
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(self.resource.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                url: self.url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(|source| SourceError::Http {
            url: self.url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl ConfigSource for KubernetesSource {
    async fn get(&self) -> Result<Snapshot, SourceError> {
        self.fetch().await?.into_snapshot()
    }

    async fn subscribe(
        &self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<mpsc::Receiver<Snapshot>, SourceError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let source = self.clone();

        tokio::spawn(async move {
            let mut last_version: Option<String> = None;
            let mut failures = 0u32;
            let max_backoff_ms = source.poll_interval.as_millis() as u64;

            loop {
                let delay = match source.fetch().await {
                    Ok(config_map) => {
                        failures = 0;
                        let version = config_map.metadata.resource_version.clone();
                        if last_version.as_deref() == Some(version.as_str()) && !version.is_empty() {
                            tracing::debug!(resource = %source.resource, version = %version, "ConfigMap unchanged");
                        } else {
                            match config_map.into_snapshot() {
                                Ok(snapshot) => {
                                    last_version = Some(version);
                                    if tx.send(snapshot).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(resource = %source.resource, error = %e, "Ignoring undecodable ConfigMap");
                                }
                            }
                        }
                        source.poll_interval
                    }
                    Err(e) => {
                        failures += 1;
                        let delay = calculate_backoff(failures, ERROR_BACKOFF_BASE_MS, max_backoff_ms);
                        tracing::warn!(
                            resource = %source.resource,
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "ConfigMap poll failed"
                        );
                        delay
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.recv() => break,
                    _ = tx.closed() => break,
                }
            }

            tracing::debug!(resource = %source.resource, "ConfigMap subscription ended");
        });

        tracing::info!(
            resource = %self.resource,
            poll_interval_secs = self.poll_interval.as_secs(),
            "Watching ConfigMap"
        );
        Ok(rx)
    }

    fn describe(&self) -> String {
        format!("configmap {} via {}", self.resource, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configmap_to_snapshot() {
        let config_map: ConfigMap = serde_json::from_str(
            r#"{
                "metadata": {"name": "app", "resourceVersion": "42"},
                "data": {"app.conf": "x=1"},
                "binaryData": {"blob.bin": "AQID"}
            }"#,
        )
        .unwrap();
        assert_eq!(config_map.metadata.resource_version, "42");

        let snapshot = config_map.into_snapshot().unwrap();
        assert_eq!(snapshot.get("app.conf"), Some(&b"x=1"[..]));
        assert_eq!(snapshot.get("blob.bin"), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_empty_configmap() {
        let config_map: ConfigMap = serde_json::from_str(r#"{"metadata": {}}"#).unwrap();
        assert!(config_map.into_snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let config_map: ConfigMap =
            serde_json::from_str(r#"{"binaryData": {"bad": "!!!"}}"#).unwrap();
        let err = config_map.into_snapshot().unwrap_err();
        assert!(matches!(err, SourceError::Decode { ref key, .. } if key == "bad"));
    }

    #[test]
    fn test_url_layout() {
        let resource = ResourceConfig::parse_qualified("monitoring/prom").unwrap();
        let source =
            KubernetesSource::new("http://127.0.0.1:8001", resource, None, Duration::from_secs(30))
                .unwrap();
        assert_eq!(
            source.url.as_str(),
            "http://127.0.0.1:8001/api/v1/namespaces/monitoring/configmaps/prom"
        );
    }
}
