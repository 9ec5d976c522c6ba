//! Graceful shutdown handling for the notification service.
//!
//! Shutdown runs in phases:
//! 1. Close live push streams so open HTTP responses can finish
//! 2. Signal channel consumers to stop taking new events
//! 3. Wait for consumers to finish their in-flight events
//! 4. Drain queued availability updates
//! 5. Close the database pool

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::server::AppState;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for consumers to finish in-flight events (default: 10 seconds)
    pub consumer_timeout: Duration,
    /// Time to wait for queued availability updates (default: 15 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            consumer_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(15),
        }
    }
}

/// Handles graceful shutdown of the notification service
pub struct GracefulShutdown {
    state: AppState,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(state: AppState) -> Self {
        Self::with_config(state, ShutdownConfig::default())
    }

    pub fn with_config(state: AppState, config: ShutdownConfig) -> Self {
        Self { state, config }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(push_connections = self.state.push.len())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Closing push streams");
        result.push_streams_closed = self.state.push.close_all();

        tracing::info!("Phase 2: Signaling consumers to stop");
        let _ = self.state.shutdown_tx.send(());

        tracing::info!("Phase 3: Waiting for consumers");
        result.consumers_stopped = timeout(self.config.consumer_timeout, self.state.consumers.join())
            .await
            .is_ok();
        if !result.consumers_stopped {
            tracing::warn!("Consumer stop timeout, in-flight events may be lost");
        }

        tracing::info!("Phase 4: Draining availability updates");
        result.projector_drained = timeout(self.config.drain_timeout, self.state.projector.shutdown())
            .await
            .is_ok();
        if !result.projector_drained {
            tracing::warn!("Projector drain timeout, queued updates may be lost");
        }

        if let Some(pool) = &self.state.postgres_pool {
            tracing::info!("Phase 5: Closing database pool");
            pool.close().await;
        }

        result.duration = start.elapsed();
        result.success = result.consumers_stopped && result.projector_drained;

        tracing::info!(
            push_streams_closed = result.push_streams_closed,
            consumers_stopped = result.consumers_stopped,
            projector_drained = result.projector_drained,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether every phase finished within its timeout
    pub success: bool,
    pub push_streams_closed: usize,
    pub consumers_stopped: bool,
    pub projector_drained: bool,
    /// Total time taken for shutdown
    pub duration: Duration,
}
