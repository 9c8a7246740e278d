//! Permission middleware: runs [`PermissionGuard`] against the effective
//! permission requirement of each operation. Denied operations never reach
//! the router.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service};

use crate::guard::PermissionGuard;
use crate::service::operation::{Operation, OperationError, OperationResponse};
use crate::service::policy::PolicyTable;

// ---------------------------------------------------------------------------
// PermissionGuardLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PermissionGuardLayer {
    policies: Arc<PolicyTable>,
}

impl PermissionGuardLayer {
    #[must_use]
    pub fn new(policies: Arc<PolicyTable>) -> Self {
        Self { policies }
    }
}

impl<S> Layer<S> for PermissionGuardLayer {
    type Service = PermissionGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PermissionGuardService {
            inner,
            policies: Arc::clone(&self.policies),
        }
    }
}

// ---------------------------------------------------------------------------
// PermissionGuardService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PermissionGuardService<S> {
    inner: S,
    policies: Arc<PolicyTable>,
}

impl<S> Service<Operation> for PermissionGuardService<S>
where
    S: Service<Operation, Response = OperationResponse, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let policy = self.policies.resolve(op.ctx().service_name, op.ctx().action);
        // Checked synchronously: outer layers call inward from inside the
        // request-context scope.
        if let Err(err) = PermissionGuard::check(policy.required_permission()) {
            return Box::pin(async move { Err(err.into()) });
        }
        Box::pin(self.inner.call(op))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use serde_json::json;
    use tower::ServiceExt;
    use warden_core::{AuthzError, Principal, RequestContext, TenantId, ADMIN_ROLE};

    use super::*;
    use crate::service::operation::OperationContext;
    use crate::service::policy::OperationPolicy;

    #[derive(Clone)]
    struct FlagService {
        ran: Arc<AtomicBool>,
    }

    impl Service<Operation> for FlagService {
        type Response = OperationResponse;
        type Error = OperationError;
        type Future =
            Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _op: Operation) -> Self::Future {
            self.ran.store(true, Ordering::SeqCst);
            Box::pin(async { Ok(OperationResponse::Empty) })
        }
    }

    fn guarded() -> (Arc<AtomicBool>, PermissionGuardService<FlagService>) {
        let policies = PolicyTable::new()
            .for_service("banner", OperationPolicy::new().require("banner:view"))
            .for_action("banner", "list", OperationPolicy::new().require("banner:list"));
        let ran = Arc::new(AtomicBool::new(false));
        let svc = PermissionGuardLayer::new(Arc::new(policies)).layer(FlagService {
            ran: Arc::clone(&ran),
        });
        (ran, svc)
    }

    fn list_op() -> Operation {
        Operation::new(OperationContext::new(1, "banner", "list"), json!({}))
    }

    #[tokio::test]
    async fn admin_reaches_handler() {
        let (ran, svc) = guarded();
        let admin = Principal::new("1", "root", Some(TenantId(1))).with_roles([ADMIN_ROLE]);

        RequestContext::scope(Some(admin), svc.oneshot(list_op()))
            .await
            .unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn operation_level_permission_overrides_service_level() {
        let (ran, svc) = guarded();
        // Holds the service-level permission only.
        let staff = Principal::new("42", "alice", Some(TenantId(7))).with_permissions(["banner:view"]);

        let err = RequestContext::scope(Some(staff), svc.oneshot(list_op()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::Authz(AuthzError::PermissionDenied { ref permission })
                if permission == "banner:list"
        ));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn anonymous_caller_is_unauthenticated() {
        let (ran, svc) = guarded();
        let err = RequestContext::scope(None, svc.oneshot(list_op()))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Authz(AuthzError::Unauthenticated)));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unprotected_service_passes_through() {
        let (ran, svc) = guarded();
        let op = Operation::new(OperationContext::new(1, "health", "ping"), json!({}));
        RequestContext::scope(None, svc.oneshot(op)).await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
