//! reqwest-based upstream client, one instance per credential.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;

use gatekeeper_core::domain::{UpstreamRequest, UpstreamResponse};
use gatekeeper_core::ports::UpstreamClient;
use gatekeeper_core::{ConfigError, UpstreamFailure};

use crate::config::{env_lookup, parse_var};

/// Longest provider error body kept in a failure message.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpUpstreamConfig {
    /// Provider root; operations are appended as path segments.
    pub base_url: String,
    /// Header that carries the credential.
    pub auth_header: String,
    /// Optional scheme prefix, e.g. `Bearer`.
    pub auth_scheme: Option<String>,
    pub timeout: Duration,
}

impl Default for HttpUpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_header: "x-api-key".to_string(),
            auth_scheme: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl HttpUpstreamConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let timeout_secs: u64 = parse_var(
            &lookup,
            "UPSTREAM_TIMEOUT_SECS",
            defaults.timeout.as_secs(),
        )?;

        Ok(Self {
            base_url: parse_var(&lookup, "UPSTREAM_BASE_URL", defaults.base_url)?,
            auth_header: parse_var(&lookup, "UPSTREAM_AUTH_HEADER", defaults.auth_header)?,
            auth_scheme: lookup("UPSTREAM_AUTH_SCHEME")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Only needed once credentials exist; an empty pool never calls out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "UPSTREAM_BASE_URL",
                value: self.base_url.clone(),
            });
        }
        if reqwest::header::HeaderName::from_bytes(self.auth_header.as_bytes()).is_err() {
            return Err(ConfigError::Invalid {
                key: "UPSTREAM_AUTH_HEADER",
                value: self.auth_header.clone(),
            });
        }
        Ok(())
    }
}

/// Client bound to a single credential. Instances share one connection
/// pool.
pub struct HttpUpstreamClient {
    client: Client,
    base_url: String,
    auth_header: String,
    auth_value: String,
    timeout: Duration,
}

impl HttpUpstreamClient {
    pub fn new(client: Client, config: &HttpUpstreamConfig, credential: &str) -> Self {
        let auth_value = match &config.auth_scheme {
            Some(scheme) => format!("{scheme} {credential}"),
            None => credential.to_string(),
        };

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_header: config.auth_header.clone(),
            auth_value,
            timeout: config.timeout,
        }
    }

    /// Builds the shared HTTP client once and returns a constructor for
    /// per-credential clients, suitable for `CapacityManager::new`.
    pub fn connector(
        config: &HttpUpstreamConfig,
    ) -> Result<impl Fn(&str) -> Arc<dyn UpstreamClient> + use<>, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Inconsistent(format!("HTTP client: {e}")))?;
        let config = config.clone();

        Ok(move |credential: &str| -> Arc<dyn UpstreamClient> {
            Arc::new(HttpUpstreamClient::new(client.clone(), &config, credential))
        })
    }

    fn url(&self, operation: &str) -> String {
        format!("{}/{}", self.base_url, operation.trim_start_matches('/'))
    }

    fn transport_failure(&self, err: reqwest::Error) -> UpstreamFailure {
        if err.is_timeout() {
            UpstreamFailure::Timeout(self.timeout)
        } else if err.is_connect() {
            UpstreamFailure::Transport(format!("Connection failed: {err}"))
        } else {
            UpstreamFailure::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamFailure> {
        let url = self.url(&request.operation);
        tracing::debug!(operation = %request.operation, "Sending upstream request");

        let response = self
            .client
            .post(&url)
            .header(self.auth_header.as_str(), self.auth_value.as_str())
            .json(&request.body)
            .send()
            .await
            .map_err(|e| self.transport_failure(e))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let text = response.text().await.map_err(|e| self.transport_failure(e))?;

        if !(200..300).contains(&status) {
            return Err(classify_status(status, retry_after.as_deref(), &text));
        }

        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        };
        Ok(UpstreamResponse { status, body })
    }
}

/// `Retry-After` as delta seconds. HTTP-date values are not honoured.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Maps a non-success status onto the failure taxonomy.
pub fn classify_status(status: u16, retry_after: Option<&str>, body: &str) -> UpstreamFailure {
    let message = truncate(body);
    match status {
        429 => UpstreamFailure::RateLimited {
            retry_after: retry_after.and_then(parse_retry_after),
            message,
        },
        400..=499 => UpstreamFailure::Client { status, message },
        _ => UpstreamFailure::Server { status, message },
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
