//! Operation routing: dispatches `Operation` to domain services by `service_name`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::util::BoxCloneService;
use tower::{Service, ServiceExt};

use super::operation::{Operation, OperationError, OperationResponse};

// ---------------------------------------------------------------------------
// Boxed domain service
// ---------------------------------------------------------------------------

/// A type-erased, cloneable Tower service handling operations for one service name.
type BoxedService = BoxCloneService<Operation, OperationResponse, OperationError>;

type BoxedFuture = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

// ---------------------------------------------------------------------------
// OperationRouter
// ---------------------------------------------------------------------------

/// Routes `Operation` values to the correct domain service by `service_name`.
///
/// Each registered service is cloned per call and driven with `oneshot` inside
/// the returned future, so handler code never runs before the future is first
/// polled. Middleware relies on this to bind the request context around it.
/// Operations with an unregistered `service_name` return
/// `OperationError::UnknownService`.
#[derive(Clone, Default)]
pub struct OperationRouter {
    services: HashMap<&'static str, BoxedService>,
}

impl OperationRouter {
    /// Create a new empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a domain service for the given name.
    pub fn register<S>(&mut self, name: &'static str, service: S)
    where
        S: Service<Operation, Response = OperationResponse, Error = OperationError>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.services.insert(name, BoxCloneService::new(service));
    }

    /// Builder form of [`OperationRouter::register`].
    #[must_use]
    pub fn with_service<S>(mut self, name: &'static str, service: S) -> Self
    where
        S: Service<Operation, Response = OperationResponse, Error = OperationError>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.register(name, service);
        self
    }

    /// Names of the registered services.
    pub fn service_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.services.keys().copied()
    }
}

impl Service<Operation> for OperationRouter {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = BoxedFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness is checked per call on the cloned domain service.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let service_name = op.ctx().service_name;
        let service = self.services.get(service_name).cloned();
        Box::pin(async move {
            match service {
                Some(svc) => svc.oneshot(op).await,
                None => Err(OperationError::UnknownService {
                    name: service_name.to_string(),
                }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tower::ServiceExt;
    use warden_core::RequestContext;

    use super::*;
    use crate::service::operation::OperationContext;

    /// Echoes the service name and the current user id back to the caller.
    #[derive(Clone)]
    struct StubService {
        name: &'static str,
    }

    impl Service<Operation> for StubService {
        type Response = OperationResponse;
        type Error = OperationError;
        type Future = BoxedFuture;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _op: Operation) -> Self::Future {
            let name = self.name;
            Box::pin(async move {
                Ok(OperationResponse::Value(json!({
                    "service": name,
                    "user": RequestContext::user_id(),
                })))
            })
        }
    }

    fn make_op(service_name: &'static str) -> Operation {
        Operation::new(OperationContext::new(1, service_name, "list"), json!({}))
    }

    fn served_by(resp: &OperationResponse) -> Option<&str> {
        match resp {
            OperationResponse::Value(v) => v["service"].as_str(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn routes_to_registered_service() {
        let router = OperationRouter::new().with_service("banner", StubService { name: "banner" });

        let resp = router.oneshot(make_op("banner")).await.unwrap();
        assert_eq!(served_by(&resp), Some("banner"));
    }

    #[tokio::test]
    async fn unknown_service_returns_error() {
        let router = OperationRouter::new().with_service("banner", StubService { name: "banner" });

        let err = router.oneshot(make_op("nonexistent")).await.unwrap_err();
        assert!(matches!(
            err,
            OperationError::UnknownService { name } if name == "nonexistent"
        ));
    }

    #[tokio::test]
    async fn routes_to_correct_service_among_multiple() {
        let mut router = OperationRouter::new();
        router.register("banner", StubService { name: "banner" });
        router.register("orders", StubService { name: "orders" });
        router.register("auth", StubService { name: "auth" });

        let resp = ServiceExt::ready(&mut router)
            .await
            .unwrap()
            .call(make_op("orders"))
            .await
            .unwrap();
        assert_eq!(served_by(&resp), Some("orders"));

        let resp = ServiceExt::ready(&mut router)
            .await
            .unwrap()
            .call(make_op("auth"))
            .await
            .unwrap();
        assert_eq!(served_by(&resp), Some("auth"));

        let mut names: Vec<_> = router.service_names().collect();
        names.sort_unstable();
        assert_eq!(names, ["auth", "banner", "orders"]);
    }

    #[tokio::test]
    async fn handler_runs_when_future_is_polled() {
        let mut router = OperationRouter::new().with_service("banner", StubService { name: "banner" });

        // Future created outside any scope, awaited inside one.
        let fut = ServiceExt::ready(&mut router)
            .await
            .unwrap()
            .call(make_op("banner"));
        let principal = warden_core::Principal::new("42", "alice", None);
        let resp = RequestContext::scope(Some(principal), fut).await.unwrap();

        match resp {
            OperationResponse::Value(v) => assert_eq!(v["user"], "42"),
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
