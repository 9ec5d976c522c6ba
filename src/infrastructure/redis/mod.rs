//! Redis connectivity
//!
//! - `RedisPool`: multiplexed publish connection plus the client used for pub/sub
//! - `CircuitBreaker`: stops publish attempts while the broker is down
//! - `ExponentialBackoff`: reconnect delays for subscriptions
//! - `RedisHealth`: pub/sub link status for health reporting

mod backoff;
mod circuit_breaker;
mod health;
mod pool;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use health::{RedisHealth, RedisHealthStats, RedisHealthStatus};
pub use pool::{PoolError, RedisPool};

pub(crate) fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
