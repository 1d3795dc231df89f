//! Sliding-window event counter.

use std::{collections::VecDeque, time::Duration};

use dashmap::DashMap;
use tokio::time::Instant;

/// Outcome of [`WindowCounter::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// The event was recorded.
    Allowed {
        /// Events still available inside the window after this one.
        remaining: u32,
    },
    /// The window is full; nothing was recorded.
    Denied {
        /// Time until the oldest entry leaves the window.
        retry_after: Duration,
    },
}

/// Per-key counter of events inside a trailing window.
///
/// Each key maps to its event timestamps, oldest first. Entries older than the
/// window are evicted on every access to that key, so a count always reflects
/// the current time. Access to one key's timestamps is serialized by the
/// shard lock of the map, concurrent events on the same key are never lost.
pub struct WindowCounter {
    window: Duration,
    entries: DashMap<String, VecDeque<Instant>>,
}

impl WindowCounter {
    /// Creates an empty counter for the given window length.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: DashMap::new(),
        }
    }

    /// The window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Appends the current time to the key's sequence.
    pub fn record(&self, key: &str) {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_owned()).or_default();
        let timestamps = entry.value_mut();

        evict(timestamps, now, self.window);
        timestamps.push_back(now);
    }

    /// Number of events for the key still inside the window.
    pub fn count(&self, key: &str) -> usize {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return 0;
        };

        let timestamps = entry.value_mut();
        evict(timestamps, Instant::now(), self.window);

        timestamps.len()
    }

    /// Records an event unless `limit` events are already inside the window.
    ///
    /// Counting and recording happen under one lock, so concurrent callers on
    /// the same key can never push the count past `limit`.
    pub fn try_acquire(&self, key: &str, limit: u32) -> Acquire {
        let now = Instant::now();
        let limit = limit as usize;

        let mut entry = self.entries.entry(key.to_owned()).or_default();
        let timestamps = entry.value_mut();

        evict(timestamps, now, self.window);

        if timestamps.len() >= limit {
            let retry_after = timestamps
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);

            return Acquire::Denied { retry_after };
        }

        timestamps.push_back(now);

        Acquire::Allowed {
            remaining: (limit - timestamps.len()) as u32,
        }
    }

    /// Drops keys whose windows are empty. Returns how many were dropped.
    pub fn compact(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();

        self.entries.retain(|_, timestamps| {
            evict(timestamps, now, self.window);
            !timestamps.is_empty()
        });

        before.saturating_sub(self.entries.len())
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}

fn evict(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = timestamps.front() {
        if now.duration_since(front) > window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}
