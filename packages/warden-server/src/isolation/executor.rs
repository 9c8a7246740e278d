use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use warden_core::QueryDescriptor;

use super::injector::TenantPredicateInjector;

/// Runs a query against the backing data store.
///
/// Implementations receive descriptors that already carry their tenant
/// predicates; they must not strip or rewrite them.
#[async_trait]
pub trait QueryExecutor: Send + Sync + 'static {
    type Rows: Send;

    async fn execute(&self, query: QueryDescriptor) -> anyhow::Result<Self::Rows>;
}

/// Data-access boundary: injects tenant predicates before every execution.
///
/// Business code gets an `IsolatedExecutor`, never the raw executor, so there
/// is no path to the store that skips injection.
pub struct IsolatedExecutor<E> {
    inner: E,
    injector: Arc<TenantPredicateInjector>,
}

impl<E: QueryExecutor> IsolatedExecutor<E> {
    #[must_use]
    pub fn new(inner: E, injector: Arc<TenantPredicateInjector>) -> Self {
        Self { inner, injector }
    }

    /// Injects with the current request context's tenant, then executes.
    ///
    /// # Errors
    ///
    /// Fails without touching the store if injection fails, otherwise
    /// propagates errors from the wrapped executor.
    pub async fn execute(&self, query: QueryDescriptor) -> anyhow::Result<E::Rows> {
        let injection = self
            .injector
            .inject(query)
            .context("tenant isolation could not be applied")?;
        tracing::debug!(
            predicates = %injection.query.literal_where(),
            fallback = injection.fallback.is_some(),
            "executing tenant-scoped query"
        );
        self.inner.execute(injection.query).await
    }
}
