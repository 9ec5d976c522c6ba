//! Link health for the Redis pub/sub connection

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};

use serde::Serialize;

use super::current_time_ms;
use crate::infrastructure::metrics::{REDIS_CONNECTION_STATUS, REDIS_RECONNECTIONS_TOTAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedisHealthStatus {
    Connected,
    Reconnecting,
}

pub struct RedisHealth {
    connected: AtomicU8,
    last_connected_ms: AtomicI64,
    reconnect_attempts: AtomicU32,
}

impl RedisHealth {
    pub fn new() -> Self {
        Self {
            connected: AtomicU8::new(0),
            last_connected_ms: AtomicI64::new(0),
            reconnect_attempts: AtomicU32::new(0),
        }
    }

    pub fn set_connected(&self) {
        self.connected.store(1, Ordering::Release);
        self.last_connected_ms.store(current_time_ms(), Ordering::Release);
        self.reconnect_attempts.store(0, Ordering::Release);
        REDIS_CONNECTION_STATUS.set(1);
    }

    pub fn set_reconnecting(&self) {
        self.connected.store(0, Ordering::Release);
        self.reconnect_attempts.fetch_add(1, Ordering::AcqRel);
        REDIS_CONNECTION_STATUS.set(0);
        REDIS_RECONNECTIONS_TOTAL.inc();
    }

    pub fn status(&self) -> RedisHealthStatus {
        if self.connected.load(Ordering::Acquire) == 1 {
            RedisHealthStatus::Connected
        } else {
            RedisHealthStatus::Reconnecting
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == RedisHealthStatus::Connected
    }

    pub fn stats(&self) -> RedisHealthStats {
        RedisHealthStats {
            status: self.status(),
            last_connected_ms: self.last_connected_ms.load(Ordering::Acquire),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Acquire),
        }
    }
}

impl Default for RedisHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisHealthStats {
    pub status: RedisHealthStatus,
    pub last_connected_ms: i64,
    pub reconnect_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_attempts_reset_on_connect() {
        let health = RedisHealth::new();
        assert!(!health.is_healthy());

        health.set_reconnecting();
        health.set_reconnecting();
        assert_eq!(health.stats().reconnect_attempts, 2);

        health.set_connected();
        let stats = health.stats();
        assert_eq!(stats.status, RedisHealthStatus::Connected);
        assert_eq!(stats.reconnect_attempts, 0);
        assert!(stats.last_connected_ms > 0);
    }
}
