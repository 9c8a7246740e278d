//! Pipeline composition: combines all middleware layers into a single service stack.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tower::ServiceBuilder;

use super::context::ContextLayer;
use super::guard::PermissionGuardLayer;
use super::metrics::MetricsLayer;
use super::rate_limit::RateLimitLayer;
use super::timeout::TimeoutLayer;
use crate::ratelimit::RateLimiter;
use crate::service::config::ServerConfig;
use crate::service::operation::{Operation, OperationError, OperationResponse};
use crate::service::policy::PolicyTable;
use crate::service::router::OperationRouter;

/// Future returned by the assembled pipeline.
pub type PipelineFuture =
    Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

/// Build the operation pipeline by wrapping the `OperationRouter` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `ContextLayer` -- bind the caller's principal for the whole unit of work
/// 2. `MetricsLayer` -- record timing and outcome, including rejections
/// 3. `TimeoutLayer` -- enforce the declared timeout, else `config.default_operation_timeout_ms`
/// 4. `RateLimitLayer` -- count the call before any permission or business work
/// 5. `PermissionGuardLayer` -- reject callers lacking the required permission
///
/// The returned service implements `tower::Service<Operation>` and is cheap to clone.
#[must_use]
pub fn build_operation_pipeline(
    config: &ServerConfig,
    router: OperationRouter,
    limiter: RateLimiter,
    policies: Arc<PolicyTable>,
) -> impl tower::Service<Operation, Response = OperationResponse, Error = OperationError, Future = PipelineFuture>
       + Clone
       + Send
       + 'static {
    ServiceBuilder::new()
        .layer(ContextLayer)
        .layer(MetricsLayer)
        .layer(TimeoutLayer::new(config.default_operation_timeout()))
        .layer(RateLimitLayer::new(limiter, Arc::clone(&policies)))
        .layer(PermissionGuardLayer::new(policies))
        .service(router)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
