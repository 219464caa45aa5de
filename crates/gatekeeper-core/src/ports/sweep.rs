use chrono::{DateTime, Utc};

/// What one sweep pass removed or restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Expired counters dropped.
    pub evicted: usize,
    /// Blocks lifted or credentials reinstated.
    pub released: usize,
}

/// A store whose expired entries can be cleaned up in the background.
///
/// Implementations check and delete entry by entry; they must not hold a
/// lock over the whole map while sweeping.
pub trait Sweepable: Send + Sync {
    fn sweep(&self, now: DateTime<Utc>) -> SweepOutcome;
}
