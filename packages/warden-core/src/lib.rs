//! Warden Core: principal model, task-local request context, and query descriptors.

pub mod context;
pub mod error;
pub mod query;
pub mod types;

pub use context::RequestContext;
pub use error::{AuthzError, ContextError, QueryError, TenantFallback};
pub use query::{is_identifier, CompareOp, Predicate, QueryDescriptor, TableRef, Value};
pub use types::{Principal, TenantId, ADMIN_ROLE};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
