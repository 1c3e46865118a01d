//! HTTP reload endpoint.
//!
//! # Responsibilities
//! - Send the configured request (default `POST`) to the reload URL
//! - Retry non-200 responses and connection errors with exponential backoff
//! - Give up once the elapsed budget (10s by default) is spent

use reqwest::{Client, Method, StatusCode};
use thiserror::Error;
use url::Url;

use crate::config::HttpRetryConfig;
use crate::reload::ReloadError;
use crate::resilience::backoff::ExponentialBackoff;
use crate::resilience::retries::{retry, Exhausted};

/// Why a single reload attempt failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("{method} request to {url} failed: {source}")]
    Request {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status code {status} from {url}")]
    Status { url: String, status: u16 },
}

/// Calls a reload endpoint on the workload.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: Client,
    url: Url,
    method: Method,
    retry: HttpRetryConfig,
}

impl HttpNotifier {
    pub fn new(url: &str, method: &str, retry: HttpRetryConfig) -> Result<Self, ReloadError> {
        let url = Url::parse(url)
            .map_err(|e| ReloadError::InvalidEndpoint(format!("{:?}: {}", url, e)))?;
        let method = if method.is_empty() {
            Method::POST
        } else {
            Method::from_bytes(method.as_bytes())
                .map_err(|e| ReloadError::InvalidEndpoint(format!("method {:?}: {}", method, e)))?
        };

        // The endpoint is a sibling container, never reached through a proxy.
        let client = Client::builder()
            .timeout(retry.request_timeout())
            .no_proxy()
            .build()
            .map_err(|e| ReloadError::InvalidEndpoint(e.to_string()))?;

        Ok(Self {
            client,
            url,
            method,
            retry,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request a reload, retrying until a 200 or the budget runs out.
    pub async fn reload(&self) -> Result<(), ReloadError> {
        let backoff = ExponentialBackoff::new(&self.retry);

        retry(backoff, |attempt| self.attempt(attempt))
            .await
            .map_err(
                |Exhausted {
                     attempts,
                     elapsed,
                     last_error,
                 }| ReloadError::RetriesExhausted {
                    method: self.method.to_string(),
                    url: self.url.to_string(),
                    attempts,
                    elapsed,
                    last_error,
                },
            )?;

        tracing::info!(url = %self.url, "Reload request succeeded");
        Ok(())
    }

    async fn attempt(&self, attempt: u32) -> Result<(), AttemptError> {
        tracing::info!(method = %self.method, url = %self.url, attempt, "Reloading");

        let response = self
            .client
            .request(self.method.clone(), self.url.clone())
            .send()
            .await
            .map_err(|source| {
                tracing::warn!(method = %self.method, url = %self.url, error = %source, "Reload request failed");
                AttemptError::Request {
                    method: self.method.clone(),
                    url: self.url.to_string(),
                    source,
                }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!(url = %self.url, status = status.as_u16(), "Unexpected status code");
            return Err(AttemptError::Status {
                url: self.url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_method_defaults_to_post() {
        let notifier =
            HttpNotifier::new("http://127.0.0.1:9090/-/reload", "", HttpRetryConfig::default())
                .unwrap();
        assert_eq!(notifier.method(), &Method::POST);
    }

    #[test]
    fn test_custom_method() {
        let notifier =
            HttpNotifier::new("http://127.0.0.1:9090/-/reload", "PUT", HttpRetryConfig::default())
                .unwrap();
        assert_eq!(notifier.method(), &Method::PUT);
        assert_eq!(notifier.url().path(), "/-/reload");
    }

    #[test]
    fn test_relative_url_rejected() {
        let err = HttpNotifier::new("/-/reload", "POST", HttpRetryConfig::default()).unwrap_err();
        assert!(matches!(err, ReloadError::InvalidEndpoint(_)));
    }
}
