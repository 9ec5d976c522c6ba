//! Message channel factory

use std::sync::Arc;

use crate::infrastructure::config::RedisConfig;
use crate::infrastructure::redis::RedisPool;

use super::{MemoryChannel, MessageChannel, RedisChannel};

/// Pick the channel backend.
///
/// - `redis.enabled` with a pool: [`RedisChannel`]. The broker does not have to
///   be reachable yet; publishes and subscribes fail locally until it is.
/// - otherwise: [`MemoryChannel`], events only travel within this process.
pub fn create_message_channel(
    config: &RedisConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn MessageChannel> {
    match (config.enabled, redis_pool) {
        (true, Some(pool)) => {
            tracing::info!(backend = "redis", "Creating Redis message channel");
            Arc::new(RedisChannel::new(pool))
        }
        (true, None) => {
            tracing::warn!("Redis channel requested but no pool available, falling back to memory");
            Arc::new(MemoryChannel::new())
        }
        (false, _) => {
            tracing::info!(backend = "memory", "Creating in-process message channel");
            Arc::new(MemoryChannel::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_redis_uses_memory() {
        let config = RedisConfig {
            enabled: false,
            ..RedisConfig::default()
        };
        assert_eq!(create_message_channel(&config, None).backend(), "memory");
    }

    #[test]
    fn test_missing_pool_falls_back() {
        let config = RedisConfig::default();
        assert_eq!(create_message_channel(&config, None).backend(), "memory");
    }

    #[test]
    fn test_pool_selects_redis() {
        let config = RedisConfig::default();
        let pool = Arc::new(RedisPool::new(&config.url).unwrap());
        assert_eq!(create_message_channel(&config, Some(pool)).backend(), "redis");
    }
}
