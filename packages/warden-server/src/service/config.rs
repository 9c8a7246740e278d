use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::isolation::TenantIsolationConfig;
use crate::ratelimit::{LimitScope, RateLimitPolicy};

/// Invalid configuration, reported once at load time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{field}: {value:?} is not a valid SQL identifier")]
    InvalidIdentifier { field: &'static str, value: String },
    #[error("{field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Server-level configuration for the authorization pipeline.
///
/// Every field has a default, so a config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Timeout in milliseconds for operations that declare none.
    pub default_operation_timeout_ms: u64,
    /// Row-level tenant isolation settings.
    pub tenant: TenantIsolationConfig,
    /// Base rate-limit policy that per-operation declarations start from.
    pub rate_limit: RateLimitPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_operation_timeout_ms: 30_000,
            tenant: TenantIsolationConfig::default(),
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Reads and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_operation_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_operation_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.window_secs",
                reason: "must be greater than zero".into(),
            });
        }
        self.tenant.validate()
    }

    #[must_use]
    pub fn default_operation_timeout(&self) -> Duration {
        Duration::from_millis(self.default_operation_timeout_ms)
    }

    /// A rate-limit policy built from the configured base with a different
    /// threshold and scope.
    #[must_use]
    pub fn rate_limit_policy(&self, max_count: u64, scope: LimitScope) -> RateLimitPolicy {
        RateLimitPolicy {
            max_count,
            scope,
            ..self.rate_limit.clone()
        }
    }
}
