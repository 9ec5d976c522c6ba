//! Infrastructure layer modules
//!
//! - `config`: Application configuration and settings
//! - `error`: HTTP-facing error type
//! - `metrics`: Prometheus collectors and helpers
//! - `postgres`: PostgreSQL connection pool
//! - `redis`: Redis pool, circuit breaker, backoff and health

pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;
pub mod redis;
