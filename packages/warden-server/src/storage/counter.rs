//! Shared counter store trait used by the rate limiter.
//!
//! The store is the only mutable state shared between concurrent operations
//! and, for networked backends, between service instances. Implementations
//! must perform increment-and-return as one atomic step.

use std::time::Duration;

use async_trait::async_trait;

/// Keyed counters with per-key expiry.
///
/// Wrapped in `Arc<dyn CounterStore>` for sharing across async boundaries.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Atomically increments the counter at `key` and returns the new count.
    ///
    /// A key that does not exist, or whose expiry has passed, starts again
    /// from zero and gets its expiry set to `ttl` from now. Later increments
    /// within the same lifetime leave the expiry unchanged.
    async fn increment(&self, key: &str, ttl: Duration) -> anyhow::Result<u64>;
}
