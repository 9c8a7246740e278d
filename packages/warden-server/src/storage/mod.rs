//! Counter storage for rate limiting.
//!
//! - [`CounterStore`]: atomic increment-and-return with per-key expiry
//! - [`engines`]: the in-memory backend and, behind the `postgres` feature,
//!   a `PostgreSQL` backend shared across instances

pub mod counter;
pub mod engines;

pub use counter::CounterStore;
pub use engines::InMemoryCounterStore;
#[cfg(feature = "postgres")]
pub use engines::PostgresCounterStore;
