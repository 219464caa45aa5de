//! Upstream provider clients.

#[cfg(feature = "http-client")]
mod http;

#[cfg(feature = "http-client")]
pub use http::{HttpUpstreamClient, HttpUpstreamConfig, classify_status, parse_retry_after};
