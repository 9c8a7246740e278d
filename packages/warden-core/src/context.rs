//! Task-local request context.
//!
//! Each logical unit of work (one inbound operation, one background task) gets
//! its own slot via [`RequestContext::scope`]. The slot is bound to the tokio
//! task, not the worker thread, so a pooled thread that picks up the next task
//! never observes the previous caller's principal. The slot is dropped when the
//! scoped future finishes or is dropped, which covers errors, timeouts and
//! cancellation alike.
//!
//! Spawned tasks do not inherit the slot. Handing work to a background task
//! requires an explicit copy through [`RequestContext::propagate`].

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

use crate::error::ContextError;
use crate::types::{Principal, TenantId};

tokio::task_local! {
    static CURRENT: RefCell<Option<Arc<Principal>>>;
}

/// Accessor for the principal bound to the current unit of work.
///
/// All accessors are associated functions: there is nothing to pass around,
/// the slot is found through the running task. Outside of any scope every read
/// behaves as if no principal were set.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext;

impl RequestContext {
    /// Runs `fut` as a unit of work with its own context slot, optionally
    /// pre-populated with `principal`.
    pub async fn scope<F>(principal: Option<Principal>, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT
            .scope(RefCell::new(principal.map(Arc::new)), fut)
            .await
    }

    /// Synchronous counterpart of [`RequestContext::scope`].
    pub fn sync_scope<R>(principal: Option<Principal>, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(RefCell::new(principal.map(Arc::new)), f)
    }

    /// Wraps `fut` in a fresh scope carrying a copy of the current principal.
    ///
    /// Use this for every handoff to `tokio::spawn` or another executor that
    /// should act on behalf of the current caller.
    pub fn propagate<F>(fut: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        let snapshot = Self::get();
        CURRENT.scope(RefCell::new(snapshot), fut)
    }

    /// Binds `principal` to the current unit of work, replacing any previous one.
    ///
    /// Reserved for the authentication boundary.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::NoActiveScope`] when called outside a scope.
    pub fn set(principal: Principal) -> Result<(), ContextError> {
        CURRENT
            .try_with(|slot| {
                *slot.borrow_mut() = Some(Arc::new(principal));
            })
            .map_err(|_| ContextError::NoActiveScope)
    }

    /// Returns the current principal, if any.
    #[must_use]
    pub fn get() -> Option<Arc<Principal>> {
        CURRENT
            .try_with(|slot| slot.borrow().clone())
            .ok()
            .flatten()
    }

    /// Removes the current principal. A no-op outside a scope.
    pub fn clear() {
        let _ = CURRENT.try_with(|slot| slot.borrow_mut().take());
    }

    #[must_use]
    pub fn user_id() -> Option<String> {
        Self::get().map(|p| p.user_id().to_string())
    }

    #[must_use]
    pub fn username() -> Option<String> {
        Self::get().map(|p| p.username().to_string())
    }

    #[must_use]
    pub fn tenant_id() -> Option<TenantId> {
        Self::get().and_then(|p| p.tenant_id())
    }

    #[must_use]
    pub fn is_authenticated() -> bool {
        Self::get().is_some()
    }

    /// False without a principal; true for admins; otherwise set membership.
    #[must_use]
    pub fn has_permission(permission: &str) -> bool {
        Self::get().is_some_and(|p| p.has_permission(permission))
    }

    #[must_use]
    pub fn has_role(role: &str) -> bool {
        Self::get().is_some_and(|p| p.has_role(role))
    }
}
