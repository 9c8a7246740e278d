//! Fixed-window rate limiting.
//!
//! - [`policy`]: declarative [`RateLimitPolicy`] and limiter key derivation
//! - [`limiter`]: [`RateLimiter`], one atomic store increment per call

pub mod limiter;
pub mod policy;

pub use limiter::{RateDecision, RateLimiter};
pub use policy::{
    limiter_key, CallerAttributes, LimitScope, RateLimitPolicy, DEFAULT_KEY_PREFIX,
    DEFAULT_MESSAGE,
};
