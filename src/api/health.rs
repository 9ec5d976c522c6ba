//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::channel::ConsumerStatsSnapshot;
use crate::infrastructure::redis::{CircuitState, RedisHealthStatus};
use crate::notification::FanoutStatsSnapshot;
use crate::projector::ProjectorStatsSnapshot;
use crate::push::PushStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub channel: ChannelHealthResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisHealthResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresHealthResponse>,
    pub storage: StorageHealthResponse,
    pub push: PushHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct ChannelHealthResponse {
    pub backend: String,
    pub consumers: usize,
}

#[derive(Debug, Serialize)]
pub struct RedisHealthResponse {
    pub status: RedisHealthStatus,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct PostgresHealthResponse {
    pub connected: bool,
    pub pool_size: u32,
    pub idle_connections: u32,
}

#[derive(Debug, Serialize)]
pub struct StorageHealthResponse {
    pub subscriptions: String,
    pub notifications: String,
    pub catalog: String,
}

#[derive(Debug, Serialize)]
pub struct PushHealthResponse {
    pub accepting: bool,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub consumers: Vec<ConsumerStatsSnapshot>,
    pub fanout: FanoutStatsSnapshot,
    pub projector: ProjectorStatsSnapshot,
    pub push: PushStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisStats>,
}

#[derive(Debug, Serialize)]
pub struct RedisStats {
    pub status: RedisHealthStatus,
    pub circuit_breaker_state: CircuitState,
    pub circuit_breaker_failures: u32,
    pub reconnect_attempts: u32,
}

/// Degraded when a configured broker or database is unreachable. The
/// service keeps answering either way.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let redis = state.redis_pool.as_ref().map(|pool| {
        let status = pool.health().status();
        RedisHealthResponse {
            status,
            connected: status == RedisHealthStatus::Connected,
        }
    });

    let postgres = state.postgres_pool.as_ref().map(|pool| {
        let inner = pool.pool();
        PostgresHealthResponse {
            connected: pool.is_available(),
            pool_size: inner.size(),
            idle_connections: inner.num_idle() as u32,
        }
    });

    let healthy = redis.as_ref().map_or(true, |r| r.connected)
        && postgres.as_ref().map_or(true, |p| p.connected);
    let status = if healthy { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        channel: ChannelHealthResponse {
            backend: state.channel.backend().to_string(),
            consumers: state.consumers.len(),
        },
        redis,
        postgres,
        storage: StorageHealthResponse {
            subscriptions: state.subscriptions.backend().to_string(),
            notifications: state.notifications.backend().to_string(),
            catalog: state.catalog.backend().to_string(),
        },
        push: PushHealthResponse {
            accepting: !state.push.is_closed(),
            connections: state.push.len(),
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let redis = state.redis_pool.as_ref().map(|pool| {
        let health = pool.health().stats();
        let breaker = pool.circuit_breaker().stats();
        RedisStats {
            status: health.status,
            circuit_breaker_state: breaker.state,
            circuit_breaker_failures: breaker.consecutive_failures,
            reconnect_attempts: health.reconnect_attempts,
        }
    });

    Json(StatsResponse {
        consumers: state.consumers.stats(),
        fanout: state.fanout.stats(),
        projector: state.projector.stats(),
        push: state.push.stats(),
        redis,
    })
}
