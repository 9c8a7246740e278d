//! Tower middleware layers for the operation pipeline.
//!
//! - [`context`]: Binds the caller's principal to the task-local request context
//! - [`metrics`]: Operation timing and counting via `tracing` spans and `metrics` counters
//! - [`timeout`]: Per-operation timeout enforcement
//! - [`rate_limit`]: Fixed-window rate limiting per declared policy
//! - [`guard`]: Declarative permission checks
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod context;
pub mod guard;
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;
pub mod timeout;

pub use context::ContextLayer;
pub use guard::PermissionGuardLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_operation_pipeline, PipelineFuture};
pub use rate_limit::RateLimitLayer;
pub use timeout::TimeoutLayer;
