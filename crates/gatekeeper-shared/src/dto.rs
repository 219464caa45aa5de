//! Data Transfer Objects - request/response types for the admin API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of a manual block request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockIpRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// A block currently in force.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedIpResponse {
    pub ip: String,
    pub blocked_until: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedIpsResponse {
    pub total: usize,
    pub blocked: Vec<BlockedIpResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// Which durable block store is in use.
    pub block_store: String,
    pub upstream_credentials: usize,
}
