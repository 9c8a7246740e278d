use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use warden_core::{is_identifier, TenantId};

use crate::service::config::ConfigError;

/// Tables that never receive a tenant predicate when no configuration says otherwise.
pub const DEFAULT_EXEMPT_TABLES: &[&str] = &[
    "sys_config",
    "sys_dict_type",
    "sys_dict_data",
    "sys_tenant",
    "sys_tenant_package",
];

/// Row-level tenant isolation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantIsolationConfig {
    /// Column carrying the owning tenant on every tenant-scoped table.
    pub tenant_column: String,
    /// Sentinel tenant used when the request context has none.
    pub default_tenant: TenantId,
    /// Tables that are shared across tenants. Matched case-insensitively.
    pub exempt_tables: Vec<String>,
}

impl Default for TenantIsolationConfig {
    fn default() -> Self {
        Self {
            tenant_column: "tenant_id".to_string(),
            default_tenant: TenantId::DEFAULT,
            exempt_tables: DEFAULT_EXEMPT_TABLES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl TenantIsolationConfig {
    /// Checks that the column and every exempt table are plain SQL identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidIdentifier`] naming the first offending entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_identifier(&self.tenant_column) || self.tenant_column.contains('.') {
            return Err(ConfigError::InvalidIdentifier {
                field: "tenant.tenant_column",
                value: self.tenant_column.clone(),
            });
        }
        if let Some(bad) = self.exempt_tables.iter().find(|t| !is_identifier(t)) {
            return Err(ConfigError::InvalidIdentifier {
                field: "tenant.exempt_tables",
                value: bad.clone(),
            });
        }
        Ok(())
    }
}

/// Immutable, case-insensitive set of exempt table names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExemptTables {
    names: HashSet<String>,
}

impl ExemptTables {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// True if `table` is exempt, either as written or by its unqualified name
    /// (`app.sys_config` matches `sys_config`).
    #[must_use]
    pub fn contains(&self, table: &str) -> bool {
        let lowered = table.to_ascii_lowercase();
        if self.names.contains(&lowered) {
            return true;
        }
        lowered
            .rsplit_once('.')
            .is_some_and(|(_, bare)| self.names.contains(bare))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
