//! Embedded storage substrate: a single SQLite file, its connection
//! pool, migration runner, and query-result cache.

pub mod cache;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod store;

pub use cache::{CacheStats, QueryCache};
pub use error::from_rusqlite;
pub use migrations::{Migration, MIGRATIONS};
pub use pool::{ConnectionPool, PoolStats};
pub use store::{Store, StoreConfig};
