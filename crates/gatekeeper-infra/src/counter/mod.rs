//! Fixed-window counters keyed by resource identity.

use std::hash::Hash;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use gatekeeper_core::domain::WindowCounter;

/// Concurrent store of fixed-window counters.
///
/// Each hit is a single read-modify-write under the map's shard lock for
/// that key, so "at most N per window" holds even when requests for the
/// same key run in parallel. No lock is ever held across an await.
pub struct WindowCounterStore<K>
where
    K: Eq + Hash,
{
    window: Duration,
    counters: DashMap<K, WindowCounter>,
}

impl<K> WindowCounterStore<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            counters: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one hit for `key` and return the counter as it stands after.
    pub fn hit(&self, key: K, now: DateTime<Utc>) -> WindowCounter {
        match self.counters.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().hit(now, self.window);
                *entry.get()
            }
            Entry::Vacant(entry) => *entry.insert(WindowCounter::start(now, self.window)),
        }
    }

    /// Current counter for `key`, ignoring one whose window is over.
    pub fn peek(&self, key: &K, now: DateTime<Utc>) -> Option<WindowCounter> {
        self.counters
            .get(key)
            .map(|counter| *counter)
            .filter(|counter| !counter.is_expired(now))
    }

    pub fn remove(&self, key: &K) {
        self.counters.remove(key);
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drop expired counters, one shard at a time. Returns how many went.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        self.counters.retain(|_, counter| {
            let keep = !counter.is_expired(now);
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }
}
