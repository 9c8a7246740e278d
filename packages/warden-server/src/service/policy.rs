//! Declarative protection policies attached to operations at registration time.
//!
//! A policy can be declared for a whole service (container level) and for a
//! single action (operation level). Resolution is per field: an operation-level
//! value wins, otherwise the service-level value applies.

use std::collections::HashMap;

use crate::ratelimit::RateLimitPolicy;

/// Protection declared for a service or a single action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationPolicy {
    /// Permission the caller must hold. `None` or an empty string means no check.
    pub permission: Option<String>,
    pub rate_limit: Option<RateLimitPolicy>,
}

impl OperationPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn require(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    /// Effective policy: fields set on `self` win over those on `fallback`.
    fn overlay(&self, fallback: &OperationPolicy) -> OperationPolicy {
        OperationPolicy {
            permission: self
                .permission
                .clone()
                .or_else(|| fallback.permission.clone()),
            rate_limit: self
                .rate_limit
                .clone()
                .or_else(|| fallback.rate_limit.clone()),
        }
    }

    /// The declared permission, with an empty declaration treated as none.
    #[must_use]
    pub fn required_permission(&self) -> Option<&str> {
        self.permission.as_deref().filter(|p| !p.is_empty())
    }
}

/// Immutable lookup of policies by `(service, action)`.
///
/// Built once while wiring the pipeline and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    services: HashMap<&'static str, OperationPolicy>,
    actions: HashMap<(&'static str, &'static str), OperationPolicy>,
}

impl PolicyTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the container-level policy for every action of `service`.
    #[must_use]
    pub fn for_service(mut self, service: &'static str, policy: OperationPolicy) -> Self {
        self.services.insert(service, policy);
        self
    }

    /// Declares the operation-level policy for `service.action`.
    #[must_use]
    pub fn for_action(
        mut self,
        service: &'static str,
        action: &'static str,
        policy: OperationPolicy,
    ) -> Self {
        self.actions.insert((service, action), policy);
        self
    }

    /// Resolves the effective policy for one operation.
    #[must_use]
    pub fn resolve(&self, service: &'static str, action: &'static str) -> OperationPolicy {
        let container = self.services.get(service).cloned().unwrap_or_default();
        match self.actions.get(&(service, action)) {
            Some(operation) => operation.overlay(&container),
            None => container,
        }
    }
}
