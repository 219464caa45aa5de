use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::later;
use crate::error::UpstreamFailure;

/// Masks a secret for display, keeping the first and last four characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Public identity of a pooled credential. Never carries the raw secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CredentialId {
    index: usize,
    masked: String,
}

impl CredentialId {
    pub fn new(index: usize, secret: &str) -> Self {
        Self {
            index,
            masked: mask_secret(secret),
        }
    }

    /// Position in the pool, stable for the process lifetime.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn masked(&self) -> &str {
        &self.masked
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.masked)
    }
}

/// Thresholds that take a credential out of rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EjectionPolicy {
    pub max_errors: u32,
    pub error_reset_window: Duration,
}

/// Why a credential was just taken out of rotation, and until when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspension {
    ErrorCeiling { until: DateTime<Utc> },
    RateLimited { until: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    Active,
    Degrading,
    Suspended,
}

/// Rolling health of one upstream credential.
///
/// `active == false` always comes with at least one reinstatement
/// deadline. The two deadlines are independent; whichever passes first
/// puts the credential back in rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub id: CredentialId,
    pub active: bool,
    pub error_count: u32,
    pub request_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub rate_limit_reset_at: Option<DateTime<Utc>>,
    pub error_reinstate_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    pub fn new(id: CredentialId) -> Self {
        Self {
            id,
            active: true,
            error_count: 0,
            request_count: 0,
            last_used_at: None,
            rate_limit_reset_at: None,
            error_reinstate_at: None,
        }
    }

    pub fn state(&self) -> CredentialState {
        if !self.active {
            CredentialState::Suspended
        } else if self.error_count > 0 {
            CredentialState::Degrading
        } else {
            CredentialState::Active
        }
    }

    /// True while a provider rate-limit deadline is still in the future.
    pub fn is_throttled(&self, now: DateTime<Utc>) -> bool {
        self.rate_limit_reset_at.is_some_and(|reset| reset > now)
    }

    /// Earliest pending reinstatement deadline, if suspended.
    pub fn suspended_until(&self) -> Option<DateTime<Utc>> {
        if self.active {
            return None;
        }
        match (self.error_reinstate_at, self.rate_limit_reset_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Successful call: one error is forgiven, not all of them.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.request_count = self.request_count.saturating_add(1);
        self.last_used_at = Some(now);
        self.error_count = self.error_count.saturating_sub(1);
    }

    /// Failed call. Returns the suspensions this failure triggered.
    pub fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        failure: &UpstreamFailure,
        policy: &EjectionPolicy,
    ) -> Vec<Suspension> {
        self.error_count = self.error_count.saturating_add(1);
        self.last_used_at = Some(now);

        let mut suspensions = Vec::new();

        if self.error_count >= policy.max_errors {
            let until = later(now, policy.error_reset_window);
            self.active = false;
            self.error_reinstate_at = Some(until);
            suspensions.push(Suspension::ErrorCeiling { until });
        }

        if let Some(retry_after) = failure.retry_after() {
            let until = later(now, retry_after);
            self.active = false;
            self.rate_limit_reset_at = Some(until);
            suspensions.push(Suspension::RateLimited { until });
        }

        suspensions
    }

    /// Apply any reinstatement whose deadline has passed.
    ///
    /// Returns true when the credential moved back into rotation.
    pub fn apply_due_reinstatement(&mut self, now: DateTime<Utc>) -> bool {
        let mut fired = false;

        if self.error_reinstate_at.is_some_and(|at| at <= now) {
            self.error_reinstate_at = None;
            self.error_count = 0;
            fired = true;
        }

        if self.rate_limit_reset_at.is_some_and(|at| at <= now) {
            self.rate_limit_reset_at = None;
            fired = true;
        }

        if fired && !self.active {
            self.active = true;
            return true;
        }
        false
    }

    /// Forced reinstatement used when the whole pool is out of rotation.
    /// A pending rate-limit deadline is kept so the credential is still
    /// skipped while the provider throttles it.
    pub fn reset(&mut self) {
        self.active = true;
        self.error_count = 0;
        self.error_reinstate_at = None;
    }
}
