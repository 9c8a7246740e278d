//! Operation routing and execution framework.
//!
//! This module implements the authorization-aware operation pipeline:
//!
//! 1. **Policies** (`policy`): Permission and rate-limit declarations per service and action
//! 2. **Middleware** (`middleware`): Tower layers (context, metrics, timeout, rate limit, guard)
//! 3. **Routing** (`router`): Dispatch to domain services by `service_name`

pub mod config;
pub mod middleware;
pub mod operation;
pub mod policy;
pub mod router;

// Re-export key types for convenient access.
pub use config::{ConfigError, ServerConfig};
pub use operation::{Operation, OperationContext, OperationError, OperationResponse};
pub use policy::{OperationPolicy, PolicyTable};
pub use router::OperationRouter;
