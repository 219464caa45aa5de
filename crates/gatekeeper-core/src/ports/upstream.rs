//! Upstream provider port.

use async_trait::async_trait;

use crate::domain::{UpstreamRequest, UpstreamResponse};
use crate::error::UpstreamFailure;

/// A client bound to exactly one credential.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamFailure>;
}
