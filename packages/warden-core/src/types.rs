use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Role tag that bypasses every permission check.
pub const ADMIN_ROLE: &str = "ROLE_ADMIN";

/// Opaque tenant identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl TenantId {
    /// Sentinel tenant used when no tenant can be resolved for a caller.
    pub const DEFAULT: TenantId = TenantId(0);
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TenantId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Resolved identity of an authenticated caller.
///
/// Immutable once built: the authentication boundary constructs it with
/// [`Principal::new`] and the builder methods, and everything downstream only
/// reads it. Replacing a caller's identity means building a new `Principal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    user_id: String,
    username: String,
    tenant_id: Option<TenantId>,
    roles: HashSet<String>,
    permissions: HashSet<String>,
}

impl Principal {
    /// Creates a principal with no roles and no permissions.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        tenant_id: Option<TenantId>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            tenant_id,
            roles: HashSet::new(),
            permissions: HashSet::new(),
        }
    }

    /// Returns the principal with the given role tags added.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Returns the principal with the given permission strings added.
    #[must_use]
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Tenant the caller belongs to, or `None` if none was resolved.
    #[must_use]
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    #[must_use]
    pub fn roles(&self) -> &HashSet<String> {
        &self.roles
    }

    #[must_use]
    pub fn permissions(&self) -> &HashSet<String> {
        &self.permissions
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles.contains(ADMIN_ROLE)
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Admins hold every permission; everyone else needs an exact match.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_admin() || self.permissions.contains(permission)
    }
}
