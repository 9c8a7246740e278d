//! Deadline middleware.
//!
//! Each operation runs under the timeout it declares, or the pipeline default
//! from [`ServerConfig`](crate::service::ServerConfig) when it declares none.
//! On expiry the inner future is dropped: the handler stops at its next await
//! and the request-context scope around it ends with it.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};
use tracing::warn;

use crate::service::operation::{Operation, OperationError, OperationResponse};

/// Applies a deadline to every operation.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutLayer {
    default: Duration,
}

impl TimeoutLayer {
    /// `default` applies to operations whose context carries no timeout.
    #[must_use]
    pub fn new(default: Duration) -> Self {
        Self { default }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            default: self.default,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    default: Duration,
}

impl<S> TimeoutService<S> {
    fn deadline_for(&self, op: &Operation) -> Duration {
        op.ctx()
            .call_timeout_ms
            .map_or(self.default, Duration::from_millis)
    }
}

impl<S> Service<Operation> for TimeoutService<S>
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
        let deadline = self.deadline_for(&op);
        let target = op.ctx().target();
        let call_id = op.ctx().call_id;
        let fut = self.inner.call(op);

        Box::pin(async move {
            tokio::time::timeout(deadline, fut).await.unwrap_or_else(|_| {
                let timeout_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
                warn!(%target, call_id, timeout_ms, "operation cancelled at deadline");
                Err(OperationError::Timeout { timeout_ms })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::OperationContext;

    /// Sets `dropped` when the handler future is dropped before finishing.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Report export that takes `work_ms` to finish.
    #[derive(Clone)]
    struct Export {
        work_ms: u64,
        dropped: Arc<AtomicBool>,
    }

    impl Service<Operation> for Export {
        type Response = OperationResponse;
        type Error = OperationError;
        type Future =
            Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, op: Operation) -> Self::Future {
            let work = Duration::from_millis(self.work_ms);
            let guard = DropFlag(Arc::clone(&self.dropped));
            let call_id = op.ctx().call_id;
            Box::pin(async move {
                tokio::time::sleep(work).await;
                std::mem::forget(guard);
                Ok(OperationResponse::Ack { call_id })
            })
        }
    }

    fn export(work_ms: u64) -> (Export, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        (
            Export {
                work_ms,
                dropped: Arc::clone(&dropped),
            },
            dropped,
        )
    }

    fn op(declared_ms: Option<u64>) -> Operation {
        let mut ctx = OperationContext::new(3, "reports", "export");
        ctx.call_timeout_ms = declared_ms;
        Operation::new(ctx, json!({}))
    }

    #[tokio::test(start_paused = true)]
    async fn declared_timeout_overrides_default() {
        let (svc, _) = export(500);
        let layer = TimeoutLayer::new(Duration::from_millis(100));

        let resp = layer.layer(svc).oneshot(op(Some(1_000))).await.unwrap();
        assert!(matches!(resp, OperationResponse::Ack { call_id: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn undeclared_timeout_uses_configured_default() {
        let (svc, dropped) = export(500);
        let layer = TimeoutLayer::new(Duration::from_millis(100));

        let err = layer.layer(svc).oneshot(op(None)).await.unwrap_err();

        assert!(matches!(err, OperationError::Timeout { timeout_ms: 100 }));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_declared_timeout_cancels_handler() {
        let (svc, dropped) = export(500);
        let layer = TimeoutLayer::new(Duration::from_secs(30));

        let err = layer.layer(svc).oneshot(op(Some(50))).await.unwrap_err();

        assert!(matches!(err, OperationError::Timeout { timeout_ms: 50 }));
        assert!(dropped.load(Ordering::SeqCst));
    }
}
