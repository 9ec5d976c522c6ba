use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::infrastructure::metrics::BackendMetrics;
use crate::notification::NotificationStore;

/// Background task that removes notifications past their expiry
pub struct ExpiryTask {
    interval: Duration,
    store: Arc<dyn NotificationStore>,
    shutdown: broadcast::Receiver<()>,
}

impl ExpiryTask {
    pub fn new(
        interval_secs: u64,
        store: Arc<dyn NotificationStore>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            store,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut cleanup_timer = tokio::time::interval(self.interval);
        // Skip immediate first tick
        cleanup_timer.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            backend = self.store.backend(),
            "Expiry task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Expiry task received shutdown signal");
                    break;
                }
                _ = cleanup_timer.tick() => {
                    self.purge().await;
                }
            }
        }

        tracing::info!("Expiry task stopped");
    }

    /// One purge pass; returns the number of rows removed
    pub async fn purge(&self) -> usize {
        match self.store.purge_expired(Utc::now()).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!(removed, "Purged expired notifications");
                }
                removed
            }
            Err(e) => {
                BackendMetrics::record_error(self.store.backend(), "purge_expired");
                tracing::warn!(error = %e, "Failed to purge expired notifications");
                0
            }
        }
    }
}
