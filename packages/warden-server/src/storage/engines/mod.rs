//! Concrete [`CounterStore`](crate::storage::CounterStore) backends.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::InMemoryCounterStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresCounterStore;
