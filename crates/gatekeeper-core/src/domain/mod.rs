//! Domain entities - the state the gatekeeper tracks per resource.

mod block;
mod credential;
mod stats;
mod upstream;
mod window;

use std::time::Duration;

use chrono::{DateTime, Utc};

pub use block::{BlockEntry, BlockRecord};
pub use credential::{
    CredentialId, CredentialRecord, CredentialState, EjectionPolicy, Suspension, mask_secret,
};
pub use stats::{
    Admission, CredentialUsage, IpStatistics, ProtectionLimits, ProtectionStats,
    RateLimitDecision, SizeCheck, UsageStats,
};
pub use upstream::{UpstreamRequest, UpstreamResponse};
pub use window::WindowCounter;

/// Adds a std duration to a timestamp, saturating instead of panicking.
pub fn later(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Time left until `deadline`, zero once it has passed.
pub fn until(now: DateTime<Utc>, deadline: DateTime<Utc>) -> Duration {
    (deadline - now).to_std().unwrap_or_default()
}
