//! Domain-level error types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Reasons an inbound request is turned away before any handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Soft rejection: the client may retry once the window resets.
    #[error("Rate limit exceeded, retry in {} seconds", retry_after.as_secs())]
    OverLimit { remaining: u32, retry_after: Duration },

    /// Hard rejection: the client is on the block list.
    #[error("Client address is blocked")]
    Blocked { until: Option<DateTime<Utc>> },

    /// The request body must shrink before it can be accepted.
    #[error("Request size {size} exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },
}

impl AdmissionError {
    /// How long the client should wait before retrying, if that is known.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            AdmissionError::OverLimit { retry_after, .. } => Some(*retry_after),
            AdmissionError::Blocked { until } => until
                .and_then(|until| (until - now).to_std().ok())
                .map(|d| d.max(Duration::from_secs(1))),
            AdmissionError::PayloadTooLarge { .. } => None,
        }
    }
}

/// A single failed attempt against the upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamFailure {
    #[error("Rate limited by upstream: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("Upstream rejected the request ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("Upstream server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Attempt timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl UpstreamFailure {
    /// Client errors are caused by the request itself, so another
    /// credential would fail the same way.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, UpstreamFailure::Client { .. })
    }

    /// The provider's retry-after hint, present only on rate-limit failures.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            UpstreamFailure::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Errors surfaced by the capacity manager to calling business logic.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("No upstream credentials are configured")]
    Configuration,

    #[error("Upstream unavailable after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        last: UpstreamFailure,
    },

    #[error("Upstream rejected the request")]
    Rejected(#[source] UpstreamFailure),
}

impl UpstreamError {
    /// The last underlying failure, for diagnostics.
    pub fn cause(&self) -> Option<&UpstreamFailure> {
        match self {
            UpstreamError::Configuration => None,
            UpstreamError::Exhausted { last, .. } => Some(last),
            UpstreamError::Rejected(failure) => Some(failure),
        }
    }
}

/// Repository-level errors.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Query execution failed: {0}")]
    Query(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Configuration validation errors, raised once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}
