//! Tenant predicate injection.
//!
//! Every outgoing query against a tenant-scoped table leaves here with exactly
//! one `tenant_column = <tenant>` predicate per such table. The tenant comes
//! from the request context; without one the configured sentinel tenant is
//! used and the fallback is reported instead of failing the query.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, warn};
use warden_core::{
    CompareOp, Predicate, QueryDescriptor, QueryError, RequestContext, TenantFallback, TenantId,
    Value,
};

use super::config::{ExemptTables, TenantIsolationConfig};
use crate::service::config::ConfigError;

/// Validated configuration snapshot read by one injection.
#[derive(Debug)]
struct Snapshot {
    tenant_column: String,
    default_tenant: TenantId,
    exempt: ExemptTables,
}

impl Snapshot {
    fn compile(config: &TenantIsolationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            tenant_column: config.tenant_column.clone(),
            default_tenant: config.default_tenant,
            exempt: ExemptTables::new(&config.exempt_tables),
        })
    }
}

/// Result of injecting one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Injection {
    /// The rewritten query.
    pub query: QueryDescriptor,
    /// Set when the sentinel tenant was used because none was resolved.
    pub fallback: Option<TenantFallback>,
}

/// Appends tenant predicates to outgoing queries.
///
/// The configuration is an immutable snapshot; [`TenantPredicateInjector::reload`]
/// swaps it as a whole, so concurrent injections see either the old or the new
/// settings and never a mix.
#[derive(Debug)]
pub struct TenantPredicateInjector {
    snapshot: ArcSwap<Snapshot>,
}

impl TenantPredicateInjector {
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration does not validate.
    pub fn new(config: &TenantIsolationConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            snapshot: ArcSwap::from_pointee(Snapshot::compile(config)?),
        })
    }

    /// Replaces the configuration atomically. The old snapshot stays in effect
    /// if `config` is invalid.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration does not validate.
    pub fn reload(&self, config: &TenantIsolationConfig) -> Result<(), ConfigError> {
        let next = Snapshot::compile(config)?;
        debug!(
            tenant_column = %next.tenant_column,
            exempt_tables = next.exempt.len(),
            "tenant isolation config reloaded"
        );
        self.snapshot.store(Arc::new(next));
        Ok(())
    }

    /// True if `table` never receives a tenant predicate.
    #[must_use]
    pub fn is_exempt(&self, table: &str) -> bool {
        self.snapshot.load().exempt.contains(table)
    }

    /// Injects using the tenant of the principal bound to the current unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] if a tenant predicate cannot be built; the query
    /// must not run in that case.
    pub fn inject(&self, query: QueryDescriptor) -> Result<Injection, QueryError> {
        self.inject_for(query, RequestContext::tenant_id())
    }

    /// Injects for an explicit tenant. `None` selects the sentinel tenant.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] if a tenant predicate cannot be built for any
    /// non-exempt table. No partially scoped query is ever returned.
    pub fn inject_for(
        &self,
        mut query: QueryDescriptor,
        tenant: Option<TenantId>,
    ) -> Result<Injection, QueryError> {
        let snapshot = self.snapshot.load();
        let column = snapshot.tenant_column.as_str();
        let resolved = tenant.unwrap_or(snapshot.default_tenant);
        let qualify = query.tables().len() > 1;

        // Build every predicate before touching the query.
        let mut scoped: Vec<(String, String, Predicate)> = Vec::new();
        for table in query.tables().iter().filter(|t| !snapshot.exempt.contains(t.name())) {
            let predicate = Predicate::eq(column, resolved);
            let predicate = if qualify {
                predicate.and_then(|p| p.qualified(table.qualifier()))
            } else {
                predicate
            };
            let predicate = predicate.inspect_err(|err| {
                warn!(table = %table.name(), error = %err, "refusing query: tenant predicate not built");
            })?;
            scoped.push((table.name().to_string(), table.qualifier().to_string(), predicate));
        }

        let wanted = Value::from(resolved);
        for (_, qualifier, predicate) in &scoped {
            let existing = query.take_predicates(|p| {
                p.op() == CompareOp::Eq
                    && p.column().eq_ignore_ascii_case(column)
                    && match p.qualifier() {
                        Some(q) => q.eq_ignore_ascii_case(qualifier),
                        None => !qualify,
                    }
            });
            for p in existing.iter().filter(|p| *p.value() != wanted) {
                warn!(
                    table = %qualifier,
                    found = %p.value(),
                    tenant = %resolved,
                    "replacing conflicting tenant predicate"
                );
            }
            query.push_predicate(predicate.clone());
        }

        let fallback = (tenant.is_none() && !scoped.is_empty()).then(|| {
            let tables: Vec<String> = scoped.into_iter().map(|(name, _, _)| name).collect();
            warn!(
                tables = ?tables,
                sentinel = %snapshot.default_tenant,
                "no tenant in request context, scoping query to sentinel tenant"
            );
            metrics::counter!("warden_tenant_fallback_total").increment(1);
            TenantFallback {
                tables,
                sentinel: snapshot.default_tenant,
            }
        });

        Ok(Injection { query, fallback })
    }
}
