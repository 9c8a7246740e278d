use std::net::IpAddr;

use warden_core::{AuthzError, Principal};

/// Context carried with every operation through the pipeline.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub call_id: u64,
    /// Service (container) the operation belongs to, e.g. `"banner"`.
    pub service_name: &'static str,
    /// Operation within the service, e.g. `"list"`.
    pub action: &'static str,
    /// Principal established by the authentication boundary. Moved into the
    /// task-local request context by `ContextLayer`; `None` afterwards.
    pub principal: Option<Principal>,
    /// Remote address of the caller, if known.
    pub client_ip: Option<IpAddr>,
    /// Timeout declared by the caller. `None` uses the pipeline default.
    pub call_timeout_ms: Option<u64>,
}

impl OperationContext {
    #[must_use]
    pub fn new(call_id: u64, service_name: &'static str, action: &'static str) -> Self {
        Self {
            call_id,
            service_name,
            action,
            principal: None,
            client_ip: None,
            call_timeout_ms: None,
        }
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.call_timeout_ms = Some(timeout_ms);
        self
    }

    #[must_use]
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    #[must_use]
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// `service.action`, used for rate-limit keys and log fields.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}.{}", self.service_name, self.action)
    }
}

/// An operation dispatched through the pipeline: routing context plus the
/// handler's input.
#[derive(Debug)]
pub struct Operation {
    pub ctx: OperationContext,
    pub payload: serde_json::Value,
}

impl Operation {
    #[must_use]
    pub fn new(ctx: OperationContext, payload: serde_json::Value) -> Self {
        Self { ctx, payload }
    }

    #[must_use]
    pub fn ctx(&self) -> &OperationContext {
        &self.ctx
    }
}

/// Successful response from an operation handler.
#[derive(Debug)]
pub enum OperationResponse {
    Ack { call_id: u64 },
    Value(serde_json::Value),
    Empty,
}

/// Errors returned by the pipeline and operation handlers.
///
/// Authorization failures keep their [`AuthzError`] kind so the boundary
/// layer can map each one to its own caller-visible response.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("unknown service: {name}")]
    UnknownService { name: String },
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error(transparent)]
    Authz(#[from] AuthzError),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OperationError {
    /// Short label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            OperationError::UnknownService { .. } => "unknown_service",
            OperationError::Timeout { .. } => "timeout",
            OperationError::Authz(AuthzError::Unauthenticated) => "unauthenticated",
            OperationError::Authz(AuthzError::PermissionDenied { .. }) => "permission_denied",
            OperationError::Authz(AuthzError::RateLimitExceeded { .. }) => "rate_limited",
            OperationError::Internal(_) => "internal",
        }
    }
}
