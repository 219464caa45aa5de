//! Inbound admission control: per-IP rate limits, suspicion escalation and
//! a block list mirrored to a durable store.
//!
//! Per address the controller walks an escalation ladder. A burst over the
//! minute limit raises the suspicion score and is tolerated until the score
//! reaches the threshold; sustained traffic over the hour limit skips the
//! ladder and blocks at once.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use gatekeeper_core::AdmissionError;
use gatekeeper_core::domain::{
    Admission, BlockEntry, BlockRecord, IpStatistics, ProtectionStats, RateLimitDecision,
    SizeCheck, later, until,
};
use gatekeeper_core::ports::{BlockStore, Clock, SweepOutcome, Sweepable};

use crate::config::AdmissionConfig;
use crate::counter::WindowCounterStore;

pub const REASON_HOURLY_LIMIT: &str = "hourly limit exceeded";
pub const REASON_SUSPICIOUS: &str = "suspicious activity";

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

/// Admission controller owning all per-IP state.
///
/// Construct one at startup and share it behind an `Arc`; every map is
/// safe for concurrent use.
pub struct AdmissionController {
    config: AdmissionConfig,
    store: Arc<dyn BlockStore>,
    clock: Arc<dyn Clock>,
    minute: WindowCounterStore<IpAddr>,
    hour: WindowCounterStore<IpAddr>,
    suspicion: DashMap<IpAddr, u32>,
    blocks: DashMap<IpAddr, BlockEntry>,
    /// Bumped on every block or unblock. A durable lookup only fills the
    /// cache if no block decision changed while it was in flight.
    block_epoch: AtomicU64,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig, store: Arc<dyn BlockStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
            minute: WindowCounterStore::new(MINUTE),
            hour: WindowCounterStore::new(HOUR),
            suspicion: DashMap::new(),
            blocks: DashMap::new(),
            block_epoch: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Single entry point for the request path: size first, then rate.
    pub async fn admit(
        &self,
        ip: IpAddr,
        content_length: Option<u64>,
    ) -> Result<Admission, AdmissionError> {
        if let Some(size) = content_length {
            if !self.check_request_size(size).allowed {
                tracing::debug!(ip = %ip, size, "Request rejected: payload too large");
                return Err(AdmissionError::PayloadTooLarge {
                    size,
                    limit: self.config.max_request_size,
                });
            }
        }

        let decision = self.check_rate_limit(ip).await;
        if decision.allowed {
            return Ok(Admission {
                remaining: decision.remaining,
                reset_after: decision.reset_after,
            });
        }

        match self.cached_block(ip, self.clock.now()) {
            Some(entry) => Err(AdmissionError::Blocked {
                until: Some(entry.blocked_until),
            }),
            None => Err(AdmissionError::OverLimit {
                remaining: 0,
                retry_after: decision.reset_after,
            }),
        }
    }

    pub fn check_request_size(&self, content_length: u64) -> SizeCheck {
        if content_length <= self.config.max_request_size {
            return SizeCheck {
                allowed: true,
                reason: None,
            };
        }
        SizeCheck {
            allowed: false,
            reason: Some(format!(
                "Request size {} exceeds maximum allowed size of {} bytes",
                content_length, self.config.max_request_size
            )),
        }
    }

    /// Memory first, then the durable store. A durable hit is cached.
    pub async fn is_blocked(&self, ip: IpAddr) -> bool {
        let now = self.clock.now();
        if self.cached_block(ip, now).is_some() {
            return true;
        }

        let epoch = self.block_epoch.load(Ordering::Acquire);
        let record = match self.store.find(ip).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "Block store lookup failed, using in-memory state");
                return false;
            }
        };

        let Some(entry) = record.and_then(|r| r.active_entry(now)) else {
            return false;
        };

        if self.block_epoch.load(Ordering::Acquire) == epoch {
            tracing::debug!(ip = %ip, until = %entry.blocked_until, "Block restored from durable store");
            self.blocks.insert(ip, entry);
        }
        true
    }

    pub async fn check_rate_limit(&self, ip: IpAddr) -> RateLimitDecision {
        if self.is_blocked(ip).await {
            let now = self.clock.now();
            let reset_after = self
                .cached_block(ip, now)
                .map(|entry| until(now, entry.blocked_until))
                .unwrap_or(self.config.block_duration);
            return RateLimitDecision::denied(reset_after);
        }

        let now = self.clock.now();

        let minute = self.minute.hit(ip, now);
        if minute.count > self.config.max_requests_per_minute {
            tracing::warn!(
                ip = %ip,
                count = minute.count,
                limit = self.config.max_requests_per_minute,
                "Minute rate limit exceeded"
            );
            self.escalate(ip).await;
            return RateLimitDecision::denied(minute.reset_after(now));
        }

        let hour = self.hour.hit(ip, now);
        if hour.count > self.config.max_requests_per_hour {
            tracing::warn!(
                ip = %ip,
                count = hour.count,
                limit = self.config.max_requests_per_hour,
                "Hourly rate limit exceeded"
            );
            let entry = self.block_ip(ip, REASON_HOURLY_LIMIT).await;
            return RateLimitDecision::denied(until(now, entry.blocked_until));
        }

        RateLimitDecision {
            allowed: true,
            remaining: minute
                .remaining(self.config.max_requests_per_minute)
                .min(hour.remaining(self.config.max_requests_per_hour)),
            reset_after: minute.reset_after(now),
        }
    }

    /// Block `ip` for the configured duration. Calling it again overwrites
    /// the deadline rather than extending it.
    pub async fn block_ip(&self, ip: IpAddr, reason: &str) -> BlockEntry {
        let now = self.clock.now();
        let entry = BlockEntry {
            ip,
            blocked_until: later(now, self.config.block_duration),
            reason: reason.to_string(),
        };

        self.blocks.insert(ip, entry.clone());
        self.block_epoch.fetch_add(1, Ordering::AcqRel);
        tracing::warn!(ip = %ip, reason, until = %entry.blocked_until, "IP blocked");

        if let Err(e) = self.store.upsert(BlockRecord::from_entry(&entry, now)).await {
            tracing::error!(ip = %ip, error = %e, "Failed to persist block, in-memory block still applies");
        }

        entry
    }

    /// Lift a block and forget the address's history, so its next request
    /// is judged as if it were new.
    pub async fn unblock_ip(&self, ip: IpAddr) {
        let now = self.clock.now();

        self.blocks.remove(&ip);
        self.suspicion.remove(&ip);
        self.minute.remove(&ip);
        self.hour.remove(&ip);
        self.block_epoch.fetch_add(1, Ordering::AcqRel);
        tracing::info!(ip = %ip, "IP unblocked");

        if let Err(e) = self.store.upsert(BlockRecord::cleared(ip, now)).await {
            tracing::error!(ip = %ip, error = %e, "Failed to clear durable block");
        }
    }

    pub fn get_ip_statistics(&self, ip: IpAddr) -> IpStatistics {
        let now = self.clock.now();
        let block = self
            .blocks
            .get(&ip)
            .map(|entry| entry.value().clone())
            .filter(|entry| entry.is_active(now));

        IpStatistics {
            ip,
            minute_requests: self.minute.peek(&ip, now).map_or(0, |c| c.count),
            hour_requests: self.hour.peek(&ip, now).map_or(0, |c| c.count),
            suspicion_score: self.suspicion.get(&ip).map_or(0, |score| *score),
            blocked: block.is_some(),
            blocked_until: block.as_ref().map(|entry| entry.blocked_until),
            block_reason: block.map(|entry| entry.reason),
        }
    }

    pub fn get_protection_stats(&self) -> ProtectionStats {
        let now = self.clock.now();
        ProtectionStats {
            tracked_ips: self.minute.len().max(self.hour.len()),
            blocked_ips: self
                .blocks
                .iter()
                .filter(|entry| entry.is_active(now))
                .count(),
            suspicious_ips: self.suspicion.iter().filter(|score| *score.value() > 0).count(),
            limits: self.config.limits(),
        }
    }

    /// Blocks currently in force, soonest expiry first.
    pub fn list_blocked(&self) -> Vec<BlockEntry> {
        let now = self.clock.now();
        let mut entries: Vec<BlockEntry> = self
            .blocks
            .iter()
            .filter(|entry| entry.is_active(now))
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|entry| entry.blocked_until);
        entries
    }

    /// Suspicion ladder, entered only from a minute-limit violation.
    async fn escalate(&self, ip: IpAddr) {
        let score = {
            let mut score = self.suspicion.entry(ip).or_insert(0);
            *score = score.saturating_add(1);
            *score
        };

        tracing::info!(
            ip = %ip,
            score,
            threshold = self.config.suspicious_threshold,
            "Suspicion score raised"
        );

        if score >= self.config.suspicious_threshold {
            self.block_ip(ip, REASON_SUSPICIOUS).await;
        }
    }

    /// Cached block for `ip`, dropping it first if it has expired.
    fn cached_block(&self, ip: IpAddr, now: DateTime<Utc>) -> Option<BlockEntry> {
        self.blocks.remove_if(&ip, |_, entry| !entry.is_active(now));
        self.blocks.get(&ip).map(|entry| entry.value().clone())
    }
}

impl Sweepable for AdmissionController {
    /// Suspicion scores are kept: only an explicit unblock clears them.
    fn sweep(&self, now: DateTime<Utc>) -> SweepOutcome {
        let evicted = self.minute.sweep(now) + self.hour.sweep(now);

        let mut released = 0;
        self.blocks.retain(|ip, entry| {
            let keep = entry.is_active(now);
            if !keep {
                tracing::debug!(ip = %ip, "Expired block released");
                released += 1;
            }
            keep
        });

        SweepOutcome { evicted, released }
    }
}

#[cfg(test)]
mod tests;
