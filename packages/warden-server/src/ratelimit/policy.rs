use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use warden_core::RequestContext;

/// Key prefix applied when a policy does not set its own.
pub const DEFAULT_KEY_PREFIX: &str = "rate_limit:";

/// Message returned to callers that exceed a policy without a custom message.
pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later";

/// Which attribute of the caller partitions the rate-limit buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitScope {
    /// One bucket shared by every caller.
    Global,
    /// One bucket per client IP address.
    Ip,
    /// One bucket per authenticated user; unauthenticated callers share one.
    User,
}

impl LimitScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LimitScope::Global => "global",
            LimitScope::Ip => "ip",
            LimitScope::User => "user",
        }
    }
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-window rate-limit policy attached to an operation or a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// Prefix of every counter key derived from this policy.
    pub key_prefix: String,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Calls allowed per key and window.
    pub max_count: u64,
    pub scope: LimitScope,
    /// User-facing message carried by the rejection.
    pub message: String,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            window_secs: 60,
            max_count: 10,
            scope: LimitScope::Global,
            message: DEFAULT_MESSAGE.to_string(),
        }
    }
}

impl RateLimitPolicy {
    #[must_use]
    pub fn new(window_secs: u64, max_count: u64, scope: LimitScope) -> Self {
        Self {
            window_secs,
            max_count,
            scope,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Identifying attributes of a caller used to pick a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerAttributes {
    pub client_ip: Option<IpAddr>,
    pub user_id: Option<String>,
}

impl CallerAttributes {
    /// Attributes of the current unit of work: the given IP plus the user id
    /// from the request context, if a principal is bound.
    #[must_use]
    pub fn current(client_ip: Option<IpAddr>) -> Self {
        Self {
            client_ip,
            user_id: RequestContext::user_id(),
        }
    }
}

/// Builds the limiter key for `target` (usually `service.action`).
///
/// Layout: `{prefix}{target}:{scope}[:{attr}]`. Callers whose attribute is
/// missing land in a dedicated bucket (`ip:unknown`, `anon`) rather than
/// bypassing the limit.
#[must_use]
pub fn limiter_key(policy: &RateLimitPolicy, target: &str, caller: &CallerAttributes) -> String {
    let prefix = &policy.key_prefix;
    match policy.scope {
        LimitScope::Global => format!("{prefix}{target}:global"),
        LimitScope::Ip => match caller.client_ip {
            Some(ip) => format!("{prefix}{target}:ip:{ip}"),
            None => format!("{prefix}{target}:ip:unknown"),
        },
        LimitScope::User => match &caller.user_id {
            Some(user) => format!("{prefix}{target}:user:{user}"),
            None => format!("{prefix}{target}:anon"),
        },
    }
}

#[cfg(test)]
mod tests {
    use warden_core::{Principal, TenantId};

    use super::*;

    #[test]
    fn defaults_match_declared_policy_defaults() {
        let policy = RateLimitPolicy::default();
        assert_eq!(policy.window_secs, 60);
        assert_eq!(policy.max_count, 10);
        assert_eq!(policy.scope, LimitScope::Global);
        assert_eq!(policy.key_prefix, "rate_limit:");
        assert_eq!(policy.message, DEFAULT_MESSAGE);
    }

    #[test]
    fn partial_policy_deserializes_with_defaults() {
        let policy: RateLimitPolicy =
            serde_json::from_str(r#"{"max_count": 3, "scope": "ip"}"#).unwrap();
        assert_eq!(policy.max_count, 3);
        assert_eq!(policy.scope, LimitScope::Ip);
        assert_eq!(policy.window_secs, 60);
    }

    #[test]
    fn global_key_ignores_caller() {
        let policy = RateLimitPolicy::default();
        let caller = CallerAttributes {
            client_ip: Some("10.0.0.1".parse().unwrap()),
            user_id: Some("42".into()),
        };
        assert_eq!(
            limiter_key(&policy, "sms.send", &caller),
            "rate_limit:sms.send:global"
        );
    }

    #[test]
    fn ip_key_uses_address_or_unknown_bucket() {
        let policy = RateLimitPolicy::new(60, 3, LimitScope::Ip);
        let known = CallerAttributes {
            client_ip: Some("10.0.0.1".parse().unwrap()),
            user_id: None,
        };
        assert_eq!(
            limiter_key(&policy, "auth.login", &known),
            "rate_limit:auth.login:ip:10.0.0.1"
        );
        assert_eq!(
            limiter_key(&policy, "auth.login", &CallerAttributes::default()),
            "rate_limit:auth.login:ip:unknown"
        );
    }

    #[test]
    fn user_key_separates_anonymous_callers() {
        let policy = RateLimitPolicy::new(60, 3, LimitScope::User).with_key_prefix("rl:");
        let user = CallerAttributes {
            client_ip: None,
            user_id: Some("anon".into()),
        };
        let anonymous = CallerAttributes::default();
        assert_eq!(limiter_key(&policy, "t", &user), "rl:t:user:anon");
        assert_eq!(limiter_key(&policy, "t", &anonymous), "rl:t:anon");
    }

    #[test]
    fn current_reads_user_from_context() {
        let p = Principal::new("42", "alice", Some(TenantId(7)));
        let attrs = RequestContext::sync_scope(Some(p), || CallerAttributes::current(None));
        assert_eq!(attrs.user_id.as_deref(), Some("42"));
        assert!(CallerAttributes::current(None).user_id.is_none());
    }
}
