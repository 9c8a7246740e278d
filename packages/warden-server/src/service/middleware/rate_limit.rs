//! Rate-limit middleware.
//!
//! Resolves the effective rate-limit policy of each operation and counts the
//! call before any inner layer runs. Operations without a policy pass through.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service};

use crate::ratelimit::{CallerAttributes, RateLimiter};
use crate::service::operation::{Operation, OperationError, OperationResponse};
use crate::service::policy::PolicyTable;

// ---------------------------------------------------------------------------
// RateLimitLayer
// ---------------------------------------------------------------------------

/// Tower layer enforcing the rate-limit policies of a [`PolicyTable`].
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: RateLimiter,
    policies: Arc<PolicyTable>,
}

impl RateLimitLayer {
    #[must_use]
    pub fn new(limiter: RateLimiter, policies: Arc<PolicyTable>) -> Self {
        Self { limiter, policies }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            policies: Arc::clone(&self.policies),
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimitService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: RateLimiter,
    policies: Arc<PolicyTable>,
}

impl<S> Service<Operation> for RateLimitService<S>
where
    S: Service<Operation, Response = OperationResponse, Error = OperationError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let (service_name, action) = (op.ctx().service_name, op.ctx().action);
        let Some(policy) = self.policies.resolve(service_name, action).rate_limit else {
            return Box::pin(inner.call(op));
        };

        // Read the caller now: this runs inside the request-context scope.
        let caller = CallerAttributes::current(op.ctx().client_ip);
        let target = op.ctx().target();
        let limiter = self.limiter.clone();
        Box::pin(async move {
            limiter.enforce(&policy, &target, &caller).await?;
            inner.call(op).await
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tower::ServiceExt;
    use warden_core::AuthzError;

    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::{LimitScope, RateLimitPolicy};
    use crate::service::operation::OperationContext;
    use crate::service::policy::OperationPolicy;
    use crate::storage::InMemoryCounterStore;

    /// Counts how many calls reached it.
    #[derive(Clone)]
    struct CountingService {
        hits: Arc<AtomicUsize>,
    }

    impl Service<Operation> for CountingService {
        type Response = OperationResponse;
        type Error = OperationError;
        type Future =
            Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _op: Operation) -> Self::Future {
            let hits = Arc::clone(&self.hits);
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(OperationResponse::Empty)
            })
        }
    }

    fn service(
        policies: PolicyTable,
    ) -> (Arc<AtomicUsize>, RateLimitService<CountingService>) {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(InMemoryCounterStore::with_clock(clock.clone()));
        let limiter = RateLimiter::with_clock(store, clock);
        let hits = Arc::new(AtomicUsize::new(0));
        let svc = RateLimitLayer::new(limiter, Arc::new(policies)).layer(CountingService {
            hits: Arc::clone(&hits),
        });
        (hits, svc)
    }

    fn login_from(ip: &str) -> Operation {
        Operation::new(
            OperationContext::new(1, "auth", "login").with_client_ip(ip.parse().unwrap()),
            json!({}),
        )
    }

    #[tokio::test]
    async fn rejected_calls_never_reach_handler() {
        let policies = PolicyTable::new().for_action(
            "auth",
            "login",
            OperationPolicy::new().rate_limit(RateLimitPolicy::new(60, 3, LimitScope::Ip)),
        );
        let (hits, mut svc) = service(policies);

        for _ in 0..3 {
            ServiceExt::ready(&mut svc)
                .await
                .unwrap()
                .call(login_from("10.0.0.1"))
                .await
                .unwrap();
        }
        let err = ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(login_from("10.0.0.1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::Authz(AuthzError::RateLimitExceeded { .. })
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        // Another address has its own bucket.
        ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(login_from("10.0.0.2"))
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn operations_without_policy_are_unlimited() {
        let (hits, mut svc) = service(PolicyTable::new());
        for _ in 0..100 {
            ServiceExt::ready(&mut svc)
                .await
                .unwrap()
                .call(login_from("10.0.0.1"))
                .await
                .unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 100);
    }
}
