use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{later, until};

/// Fixed-window counter.
///
/// `count` only grows while `now < window_reset_at`. Once the window is
/// over the counter is logically expired and the next hit replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounter {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

impl WindowCounter {
    /// A fresh window holding its first hit.
    pub fn start(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 1,
            window_reset_at: later(now, window),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_reset_at
    }

    /// Record one hit, starting a new window if the current one is over.
    pub fn hit(&mut self, now: DateTime<Utc>, window: Duration) {
        if self.is_expired(now) {
            *self = Self::start(now, window);
        } else {
            self.count = self.count.saturating_add(1);
        }
    }

    pub fn remaining(&self, limit: u32) -> u32 {
        limit.saturating_sub(self.count)
    }

    pub fn reset_after(&self, now: DateTime<Utc>) -> Duration {
        until(now, self.window_reset_at)
    }
}
