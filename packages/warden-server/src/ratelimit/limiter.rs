//! Fixed-window rate limiter over a shared [`CounterStore`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use warden_core::AuthzError;

use super::policy::{limiter_key, CallerAttributes, RateLimitPolicy};
use crate::clock::{ClockSource, SystemClock};
use crate::service::operation::OperationError;
use crate::storage::CounterStore;

/// Outcome of counting one call against a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The call fits in the current window.
    Allowed { count: u64, remaining: u64 },
    /// The window is exhausted; a new one starts in `retry_after_secs`.
    Denied { count: u64, retry_after_secs: u64 },
}

/// Counts calls per `(key, window)` and rejects those beyond the policy threshold.
///
/// `window = floor(now / window_secs)`. Each call performs exactly one atomic
/// increment against the store and compares the returned count, so the
/// decision holds across concurrent callers and across instances sharing the
/// store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn ClockSource>,
}

impl RateLimiter {
    /// Creates a limiter reading the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(store: Arc<dyn CounterStore>, clock: Arc<dyn ClockSource>) -> Self {
        Self { store, clock }
    }

    /// Counts one call and reports whether it is within the limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter store fails.
    pub async fn check(
        &self,
        policy: &RateLimitPolicy,
        target: &str,
        caller: &CallerAttributes,
    ) -> anyhow::Result<RateDecision> {
        let window_secs = policy.window_secs.max(1);
        let now_secs = self.clock.now_secs();
        let window = now_secs / window_secs;

        let key = limiter_key(policy, target, caller);
        let bucket = format!("{key}:{window}");
        let count = self
            .store
            .increment(&bucket, Duration::from_secs(window_secs))
            .await?;

        if count > policy.max_count {
            let retry_after_secs = (window + 1) * window_secs - now_secs;
            return Ok(RateDecision::Denied {
                count,
                retry_after_secs,
            });
        }

        Ok(RateDecision::Allowed {
            count,
            remaining: policy.max_count - count,
        })
    }

    /// Counts one call and converts a denial into a typed rejection.
    ///
    /// A failing store rejects the call as well: an unreachable store must not
    /// turn the limit off.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::RateLimitExceeded`] carrying the policy message
    /// when the limit is hit, or `OperationError::Internal` if the store fails.
    pub async fn enforce(
        &self,
        policy: &RateLimitPolicy,
        target: &str,
        caller: &CallerAttributes,
    ) -> Result<(), OperationError> {
        match self.check(policy, target, caller).await? {
            RateDecision::Allowed { count, remaining } => {
                debug!(operation = target, count, remaining, scope = %policy.scope, "rate limit passed");
                Ok(())
            }
            RateDecision::Denied {
                count,
                retry_after_secs,
            } => {
                warn!(
                    operation = target,
                    count,
                    limit = policy.max_count,
                    window_secs = policy.window_secs,
                    scope = %policy.scope,
                    user_id = caller.user_id.as_deref().unwrap_or("-"),
                    retry_after_secs,
                    "rate limit exceeded"
                );
                metrics::counter!(
                    "warden_rate_limited_total",
                    "operation" => target.to_string(),
                    "scope" => policy.scope.as_str()
                )
                .increment(1);
                Err(AuthzError::RateLimitExceeded {
                    message: policy.message.clone(),
                }
                .into())
            }
        }
    }
}
