use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// In-memory block list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub ip: IpAddr,
    pub blocked_until: DateTime<Utc>,
    pub reason: String,
}

impl BlockEntry {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until > now
    }
}

/// Durable block record, one row per address ever blocked.
///
/// This copy is authoritative across restarts; the in-memory
/// [`BlockEntry`] map is only a cache of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub ip_address: IpAddr,
    pub blocked: bool,
    pub blocked_until: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl BlockRecord {
    pub fn from_entry(entry: &BlockEntry, now: DateTime<Utc>) -> Self {
        Self {
            ip_address: entry.ip,
            blocked: true,
            blocked_until: Some(entry.blocked_until),
            reason: Some(entry.reason.clone()),
            updated_at: now,
        }
    }

    pub fn cleared(ip: IpAddr, now: DateTime<Utc>) -> Self {
        Self {
            ip_address: ip,
            blocked: false,
            blocked_until: None,
            reason: None,
            updated_at: now,
        }
    }

    /// A record without a deadline never counts as blocked.
    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked && self.blocked_until.is_some_and(|until| until > now)
    }

    /// Cache entry for a record that is still in force.
    pub fn active_entry(&self, now: DateTime<Utc>) -> Option<BlockEntry> {
        if !self.is_blocked(now) {
            return None;
        }
        Some(BlockEntry {
            ip: self.ip_address,
            blocked_until: self.blocked_until?,
            reason: self
                .reason
                .clone()
                .unwrap_or_else(|| "blocked".to_string()),
        })
    }
}
