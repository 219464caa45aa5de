//! Outbound capacity management over a pool of upstream credentials.
//!
//! Calls rotate round-robin over the credentials that are in rotation.
//! Failures push a credential towards ejection, successes slowly earn its
//! trust back, and a provider rate-limit signal takes it out until the
//! provider's own deadline.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use gatekeeper_core::domain::{
    CredentialId, CredentialRecord, CredentialUsage, EjectionPolicy, Suspension, UpstreamRequest,
    UpstreamResponse, UsageStats, until,
};
use gatekeeper_core::ports::{Clock, SweepOutcome, Sweepable, UpstreamClient};
use gatekeeper_core::{UpstreamError, UpstreamFailure};

use crate::config::{CapacityConfig, dedupe_credentials};
use crate::counter::WindowCounterStore;

const USAGE_WINDOW: Duration = Duration::from_secs(60);

struct PooledCredential {
    client: Arc<dyn UpstreamClient>,
    record: Mutex<CredentialRecord>,
}

impl PooledCredential {
    // Never held across an await.
    fn record(&self) -> MutexGuard<'_, CredentialRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Credential pool with retry across credentials.
///
/// The pool is fixed at construction. An empty pool is a valid degraded
/// state: every call fails fast with [`UpstreamError::Configuration`].
pub struct CapacityManager {
    pool: Vec<PooledCredential>,
    cursor: AtomicUsize,
    policy: EjectionPolicy,
    max_retries: u32,
    attempt_timeout: Duration,
    clock: Arc<dyn Clock>,
    recent: WindowCounterStore<usize>,
}

impl CapacityManager {
    /// Builds one client per distinct credential through `connect`.
    pub fn new<F>(config: &CapacityConfig, clock: Arc<dyn Clock>, connect: F) -> Self
    where
        F: Fn(&str) -> Arc<dyn UpstreamClient>,
    {
        let pool: Vec<PooledCredential> = dedupe_credentials(&config.credentials)
            .iter()
            .enumerate()
            .map(|(index, secret)| PooledCredential {
                client: connect(secret),
                record: Mutex::new(CredentialRecord::new(CredentialId::new(index, secret))),
            })
            .collect();

        if pool.is_empty() {
            tracing::warn!("No upstream credentials configured, upstream calls will fail");
        } else {
            tracing::info!(credentials = pool.len(), "Upstream credential pool ready");
        }

        Self {
            pool,
            cursor: AtomicUsize::new(0),
            policy: config.policy(),
            max_retries: config.max_retries,
            attempt_timeout: config.attempt_timeout,
            clock,
            recent: WindowCounterStore::new(USAGE_WINDOW),
        }
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Next credential in rotation, or `None` when every one is suspended.
    /// The cursor advances on every call.
    pub fn next_credential(&self) -> Option<CredentialId> {
        let now = self.clock.now();
        self.select(now)
            .map(|index| self.pool[index].record().id.clone())
    }

    /// Call the provider with the configured retry budget and timeout.
    pub async fn perform_call(
        &self,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.perform_call_with(request, self.max_retries, self.attempt_timeout)
            .await
    }

    /// Call the provider, trying up to `max_retries` attempts across the
    /// pool. Each attempt is bounded by `attempt_timeout`.
    pub async fn perform_call_with(
        &self,
        request: &UpstreamRequest,
        max_retries: u32,
        attempt_timeout: Duration,
    ) -> Result<UpstreamResponse, UpstreamError> {
        if self.pool.is_empty() {
            tracing::error!(operation = %request.operation, "Upstream call without credentials");
            return Err(UpstreamError::Configuration);
        }

        let attempts = max_retries.max(1);
        let mut made = 0;
        // Throttled credentials seen since the last real attempt.
        let mut throttled = HashSet::new();
        let mut last_failure = None;

        while made < attempts {
            let now = self.clock.now();
            let index = match self.select(now) {
                Some(index) => index,
                None => {
                    self.reset_pool();
                    0
                }
            };

            if self.pool[index].record().is_throttled(now) {
                throttled.insert(index);
                if self.rotation_exhausted(&throttled) {
                    tracing::warn!(
                        operation = %request.operation,
                        "Every credential in rotation is rate limited"
                    );
                    break;
                }
                continue;
            }
            throttled.clear();
            made += 1;

            match self.attempt(index, request, attempt_timeout).await {
                Ok(response) => return Ok(response),
                Err(failure) if !failure.is_retryable() => {
                    return Err(UpstreamError::Rejected(failure));
                }
                Err(failure) => {
                    tracing::warn!(
                        operation = %request.operation,
                        attempt = made,
                        max_attempts = attempts,
                        error = %failure,
                        "Upstream attempt failed"
                    );
                    last_failure = Some(failure);
                }
            }
        }

        let last = last_failure.unwrap_or_else(|| self.throttled_failure(self.clock.now()));
        tracing::error!(
            operation = %request.operation,
            attempts = made,
            error = %last,
            "Upstream call exhausted"
        );
        Err(UpstreamError::Exhausted {
            attempts: made,
            last,
        })
    }

    /// Put every credential back in rotation with a clean error tally.
    /// Pending rate-limit deadlines survive, so throttled credentials are
    /// still skipped.
    pub fn reset_pool(&self) {
        for pooled in &self.pool {
            pooled.record().reset();
        }
        tracing::warn!(
            credentials = self.pool.len(),
            "All upstream credentials were suspended, pool reset"
        );
    }

    /// Masked snapshot of the pool. Due reinstatements are reflected in the
    /// snapshot without being applied.
    pub fn get_usage_stats(&self) -> UsageStats {
        let now = self.clock.now();
        let credentials: Vec<CredentialUsage> = self
            .pool
            .iter()
            .enumerate()
            .map(|(index, pooled)| {
                let mut record = pooled.record().clone();
                record.apply_due_reinstatement(now);
                CredentialUsage {
                    id: record.id.to_string(),
                    state: record.state(),
                    active: record.active,
                    error_count: record.error_count,
                    request_count: record.request_count,
                    requests_last_minute: self.recent.peek(&index, now).map_or(0, |c| c.count),
                    last_used_at: record.last_used_at,
                    rate_limit_reset_at: record.rate_limit_reset_at.filter(|at| *at > now),
                    suspended_until: record.suspended_until(),
                }
            })
            .collect();

        UsageStats {
            total_credentials: credentials.len(),
            active_credentials: credentials.iter().filter(|c| c.active).count(),
            credentials,
        }
    }

    /// Round-robin over the credentials in rotation, reinstating any whose
    /// deadline has passed first.
    fn select(&self, now: DateTime<Utc>) -> Option<usize> {
        let active: Vec<usize> = self
            .pool
            .iter()
            .enumerate()
            .filter_map(|(index, pooled)| {
                let mut record = pooled.record();
                if record.apply_due_reinstatement(now) {
                    tracing::info!(credential = %record.id, "Upstream credential reinstated");
                }
                record.active.then_some(index)
            })
            .collect();

        if active.is_empty() {
            return None;
        }
        let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
        Some(active[turn % active.len()])
    }

    async fn attempt(
        &self,
        index: usize,
        request: &UpstreamRequest,
        attempt_timeout: Duration,
    ) -> Result<UpstreamResponse, UpstreamFailure> {
        let pooled = &self.pool[index];
        self.recent.hit(index, self.clock.now());

        let outcome = match tokio::time::timeout(attempt_timeout, pooled.client.send(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(UpstreamFailure::Timeout(attempt_timeout)),
        };

        let now = self.clock.now();
        let mut record = pooled.record();
        match &outcome {
            Ok(_) => record.record_success(now),
            // The provider refused the request itself; the credential is not at fault.
            Err(failure) if !failure.is_retryable() => {
                tracing::debug!(credential = %record.id, error = %failure, "Upstream rejected request");
            }
            Err(failure) => {
                for suspension in record.record_failure(now, failure, &self.policy) {
                    match suspension {
                        Suspension::ErrorCeiling { until } => tracing::warn!(
                            credential = %record.id,
                            errors = record.error_count,
                            until = %until,
                            "Upstream credential suspended after repeated errors"
                        ),
                        Suspension::RateLimited { until } => tracing::warn!(
                            credential = %record.id,
                            until = %until,
                            "Upstream credential rate limited"
                        ),
                    }
                }
            }
        }

        outcome
    }

    /// True once every credential in rotation has been found throttled.
    /// Other callers share the cursor, so the same credential may come up
    /// more than once before the rest do.
    fn rotation_exhausted(&self, throttled: &HashSet<usize>) -> bool {
        self.pool
            .iter()
            .enumerate()
            .all(|(index, pooled)| throttled.contains(&index) || !pooled.record().active)
    }

    /// Failure reported when no attempt could be made because every
    /// candidate was throttled.
    fn throttled_failure(&self, now: DateTime<Utc>) -> UpstreamFailure {
        let soonest = self
            .pool
            .iter()
            .filter_map(|pooled| pooled.record().rate_limit_reset_at)
            .filter(|at| *at > now)
            .min();
        UpstreamFailure::RateLimited {
            retry_after: soonest.map(|at| until(now, at)),
            message: "all upstream credentials are rate limited".to_string(),
        }
    }
}

impl Sweepable for CapacityManager {
    fn sweep(&self, now: DateTime<Utc>) -> SweepOutcome {
        let mut released = 0;
        for pooled in &self.pool {
            let mut record = pooled.record();
            if record.apply_due_reinstatement(now) {
                tracing::info!(credential = %record.id, "Upstream credential reinstated");
                released += 1;
            }
        }

        SweepOutcome {
            evicted: self.recent.sweep(now),
            released,
        }
    }
}

#[cfg(test)]
mod tests;
