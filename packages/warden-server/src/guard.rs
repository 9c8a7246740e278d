//! Permission guard: the allow/deny gate evaluated right before a protected
//! operation body runs.

use std::future::Future;

use tracing::{debug, warn};
use warden_core::{AuthzError, RequestContext};

use crate::service::operation::OperationError;

/// Pure predicate gate over the current [`RequestContext`].
///
/// Never mutates the context. An absent or empty requirement always passes.
#[derive(Debug, Clone, Copy)]
pub struct PermissionGuard;

impl PermissionGuard {
    /// Checks `requirement` against the principal bound to the current unit of work.
    ///
    /// # Errors
    ///
    /// - [`AuthzError::Unauthenticated`] if a permission is required and no
    ///   principal is bound.
    /// - [`AuthzError::PermissionDenied`] if the principal lacks the permission
    ///   and is not an admin.
    pub fn check(requirement: Option<&str>) -> Result<(), AuthzError> {
        let Some(permission) = requirement.filter(|p| !p.is_empty()) else {
            return Ok(());
        };

        let Some(principal) = RequestContext::get() else {
            warn!(permission, "permission check without authenticated principal");
            metrics::counter!("warden_permission_denied_total", "reason" => "unauthenticated")
                .increment(1);
            return Err(AuthzError::Unauthenticated);
        };

        if principal.has_permission(permission) {
            debug!(permission, user_id = principal.user_id(), "permission granted");
            return Ok(());
        }

        warn!(
            permission,
            user_id = principal.user_id(),
            username = principal.username(),
            "permission denied"
        );
        metrics::counter!("warden_permission_denied_total", "reason" => "missing_permission")
            .increment(1);
        Err(AuthzError::PermissionDenied {
            permission: permission.to_string(),
        })
    }

    /// Runs `operation` only if [`PermissionGuard::check`] passes.
    ///
    /// `operation` is not even called on denial, so it cannot leave partial
    /// side effects behind.
    ///
    /// # Errors
    ///
    /// Returns the guard's rejection, or whatever `operation` returns.
    pub async fn protect<F, Fut, T>(requirement: Option<&str>, operation: F) -> Result<T, OperationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        Self::check(requirement)?;
        operation().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use warden_core::{Principal, TenantId, ADMIN_ROLE};

    use super::*;

    fn admin() -> Principal {
        Principal::new("1", "root", Some(TenantId(1))).with_roles([ADMIN_ROLE])
    }

    fn staff() -> Principal {
        Principal::new("42", "alice", Some(TenantId(7)))
            .with_roles(["ROLE_STAFF"])
            .with_permissions(["banner:view"])
    }

    #[test]
    fn no_requirement_always_passes() {
        assert!(PermissionGuard::check(None).is_ok());
        assert!(PermissionGuard::check(Some("")).is_ok());
    }

    #[test]
    fn admin_passes_without_permissions() {
        RequestContext::sync_scope(Some(admin()), || {
            assert!(PermissionGuard::check(Some("banner:list")).is_ok());
        });
    }

    #[test]
    fn staff_without_permission_is_denied() {
        RequestContext::sync_scope(Some(staff()), || {
            assert_eq!(
                PermissionGuard::check(Some("banner:list")),
                Err(AuthzError::PermissionDenied {
                    permission: "banner:list".into()
                })
            );
            assert!(PermissionGuard::check(Some("banner:view")).is_ok());
        });
    }

    #[test]
    fn missing_principal_is_unauthenticated() {
        RequestContext::sync_scope(None, || {
            assert_eq!(
                PermissionGuard::check(Some("banner:list")),
                Err(AuthzError::Unauthenticated)
            );
        });
    }

    #[tokio::test]
    async fn protect_skips_body_on_denial() {
        let ran = AtomicBool::new(false);
        let result = RequestContext::scope(Some(staff()), async {
            PermissionGuard::protect(Some("banner:delete"), || async {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
        })
        .await;

        assert!(matches!(
            result,
            Err(OperationError::Authz(AuthzError::PermissionDenied { .. }))
        ));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn protect_runs_body_when_allowed() {
        let value = RequestContext::scope(Some(staff()), async {
            PermissionGuard::protect(Some("banner:view"), || async { Ok(5) }).await
        })
        .await
        .unwrap();
        assert_eq!(value, 5);
    }
}
