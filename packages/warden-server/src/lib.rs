//! Warden Server: request authorization pipeline with permission checks,
//! rate limiting and row-level tenant isolation.

pub mod clock;
pub mod guard;
pub mod isolation;
pub mod ratelimit;
pub mod service;
pub mod storage;
pub mod telemetry;

pub use guard::PermissionGuard;
pub use isolation::{IsolatedExecutor, QueryExecutor, TenantPredicateInjector};
pub use ratelimit::{RateLimitPolicy, RateLimiter};
pub use service::{ConfigError, OperationError, ServerConfig};
