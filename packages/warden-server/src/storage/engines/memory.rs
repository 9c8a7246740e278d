//! In-memory [`CounterStore`] implementation backed by [`DashMap`].
//!
//! Suitable for single-instance deployments and tests. Each increment holds
//! the key's shard lock for the read-modify-write, so concurrent callers on
//! the same key never lose updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::clock::{ClockSource, SystemClock};
use crate::storage::counter::CounterStore;

/// Expired buckets are swept after this many writes.
const SWEEP_INTERVAL_WRITES: u64 = 1024;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u64,
    expires_at_ms: u64,
}

/// In-memory counter store with lazy expiry.
///
/// An expired bucket is reset when next written, and expired buckets for
/// keys that are never written again are dropped by a periodic sweep piggy-
/// backed on writes. There is no background task.
pub struct InMemoryCounterStore {
    buckets: DashMap<String, Bucket>,
    clock: Arc<dyn ClockSource>,
    writes: AtomicU64,
}

impl InMemoryCounterStore {
    /// Creates an empty store reading the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store reading `clock` for expiry decisions.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
            writes: AtomicU64::new(0),
        }
    }

    /// Number of buckets currently held, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Current count for `key`, or `None` if absent or expired.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_millis();
        self.buckets
            .get(key)
            .filter(|b| b.expires_at_ms > now)
            .map(|b| b.count)
    }

    /// Drops every expired bucket and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.buckets.len();
        self.buckets.retain(|_, b| b.expires_at_ms > now);
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!(removed, "purged expired rate-limit buckets");
        }
        removed
    }

    fn increment_now(&self, key: &str, ttl: Duration) -> u64 {
        let now = self.clock.now_millis();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expires_at_ms = now.saturating_add(ttl_ms);

        let count = {
            let mut bucket = self
                .buckets
                .entry(key.to_string())
                .or_insert(Bucket {
                    count: 0,
                    expires_at_ms,
                });
            if bucket.expires_at_ms <= now {
                bucket.count = 0;
                bucket.expires_at_ms = expires_at_ms;
            }
            bucket.count += 1;
            bucket.count
        };

        // The entry guard is released above; retain() takes every shard lock.
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_INTERVAL_WRITES == 0 {
            self.purge_expired();
        }

        count
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> anyhow::Result<u64> {
        Ok(self.increment_now(key, ttl))
    }
}
