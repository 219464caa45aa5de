//! Decisions and read-only snapshots handed to callers.

use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::CredentialState;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Time until the minute window resets.
    #[serde(with = "seconds")]
    pub reset_after: Duration,
}

impl RateLimitDecision {
    pub fn denied(reset_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_after,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeCheck {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A request that passed every admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Limits in force, echoed in stats for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProtectionLimits {
    pub max_request_size: u64,
    pub max_requests_per_minute: u32,
    pub max_requests_per_hour: u32,
    pub block_duration_minutes: u32,
    pub suspicious_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpStatistics {
    pub ip: IpAddr,
    pub minute_requests: u32,
    pub hour_requests: u32,
    pub suspicion_score: u32,
    pub blocked: bool,
    pub blocked_until: Option<DateTime<Utc>>,
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtectionStats {
    pub tracked_ips: usize,
    pub blocked_ips: usize,
    pub suspicious_ips: usize,
    pub limits: ProtectionLimits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialUsage {
    /// Masked identifier, never the secret.
    pub id: String,
    pub state: CredentialState,
    pub active: bool,
    pub error_count: u32,
    pub request_count: u64,
    pub requests_last_minute: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub rate_limit_reset_at: Option<DateTime<Utc>>,
    pub suspended_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub total_credentials: usize,
    pub active_credentials: usize,
    pub credentials: Vec<CredentialUsage>,
}

mod seconds {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}
