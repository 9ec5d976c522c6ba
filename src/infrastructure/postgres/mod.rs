//! PostgreSQL connection pool and schema bootstrap.

mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
