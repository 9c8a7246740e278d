use crate::types::TenantId;

/// Authorization failures that abort a unit of work before any business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    /// A principal is required but none is bound to the current unit of work.
    #[error("authentication required")]
    Unauthenticated,
    /// The principal is present but lacks the permission and is not an admin.
    #[error("permission denied: {permission}")]
    PermissionDenied { permission: String },
    /// The caller's rate-limit bucket for the current window is exhausted.
    #[error("{message}")]
    RateLimitExceeded { message: String },
}

/// Non-fatal signal: a query was scoped to the sentinel tenant because no
/// tenant could be resolved from the request context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantFallback {
    /// Tables that received the sentinel predicate.
    pub tables: Vec<String>,
    /// The tenant id that was used instead.
    pub sentinel: TenantId,
}

/// Misuse of the task-local request context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("no request context scope is active for the current task")]
    NoActiveScope,
}

/// Errors from building query descriptors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}
