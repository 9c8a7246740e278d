//! Row-level tenant isolation for outgoing queries.
//!
//! - [`config`]: tenant column, sentinel tenant and exempt tables
//! - [`injector`]: appends tenant predicates to query descriptors
//! - [`executor`]: data-access boundary that injects before executing

pub mod config;
pub mod executor;
pub mod injector;

pub use config::{ExemptTables, TenantIsolationConfig, DEFAULT_EXEMPT_TABLES};
pub use executor::{IsolatedExecutor, QueryExecutor};
pub use injector::{Injection, TenantPredicateInjector};
