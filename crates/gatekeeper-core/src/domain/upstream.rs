use serde::{Deserialize, Serialize};

/// A call to the upstream provider, independent of which credential sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamRequest {
    /// Provider operation, appended to the base URL by HTTP clients.
    pub operation: String,
    pub body: serde_json::Value,
}

impl UpstreamRequest {
    pub fn new(operation: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            operation: operation.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: serde_json::Value,
}
