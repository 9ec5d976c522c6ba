//! Availability projector: keeps a book's copy count in step with borrow and
//! return events published by the circulation service.
//!
//! Every change for a book id goes through the same executor shard, and the
//! catalog applies it as one bounded update, so concurrent events for one book
//! cannot interleave a read and a write.

mod executor;

pub use executor::{ExecutorError, Job, KeyedExecutor};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::catalog::{AdjustOutcome, AvailabilityChange, CatalogClient, CatalogError};
use crate::infrastructure::config::ProjectorConfig;
use crate::infrastructure::metrics::ProjectorMetrics;

#[derive(Debug, Error)]
pub enum ProjectorError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Projector is shut down")]
    Closed,
}

impl From<ExecutorError> for ProjectorError {
    fn from(_: ExecutorError) -> Self {
        ProjectorError::Closed
    }
}

#[derive(Debug, Default)]
struct ProjectorStats {
    applied: AtomicU64,
    not_found: AtomicU64,
    no_copies: AtomicU64,
    at_capacity: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectorStatsSnapshot {
    pub shards: usize,
    pub applied: u64,
    pub not_found: u64,
    pub no_copies: u64,
    pub at_capacity: u64,
    pub failed: u64,
}

pub struct AvailabilityProjector {
    catalog: Arc<dyn CatalogClient>,
    executor: KeyedExecutor,
    stats: Arc<ProjectorStats>,
}

impl AvailabilityProjector {
    pub fn new(catalog: Arc<dyn CatalogClient>, config: &ProjectorConfig) -> Self {
        Self {
            catalog,
            executor: KeyedExecutor::new("availability", config.shards, config.queue_capacity),
            stats: Arc::new(ProjectorStats::default()),
        }
    }

    /// Apply one change and wait for its outcome.
    ///
    /// A missing book, a borrow with no copies left and a return at capacity
    /// are skipped outcomes, not errors.
    #[tracing::instrument(skip(self, change), fields(change = change.as_str()))]
    pub async fn apply(
        &self,
        book_id: &str,
        change: AvailabilityChange,
    ) -> Result<AdjustOutcome, ProjectorError> {
        let (done_tx, done_rx) = oneshot::channel();
        let catalog = Arc::clone(&self.catalog);
        let stats = Arc::clone(&self.stats);
        let key = book_id.to_string();

        let job = async move {
            let result = catalog.adjust_availability(&key, change).await;
            record(&stats, &key, change, &result);
            let _ = done_tx.send(result);
        }
        .boxed();

        self.executor.submit(book_id, job).await?;
        // A panicking job drops the sender
        let result = done_rx.await.map_err(|_| ProjectorError::Closed)?;
        Ok(result?)
    }

    pub fn stats(&self) -> ProjectorStatsSnapshot {
        ProjectorStatsSnapshot {
            shards: self.executor.shards(),
            applied: self.stats.applied.load(Ordering::Relaxed),
            not_found: self.stats.not_found.load(Ordering::Relaxed),
            no_copies: self.stats.no_copies.load(Ordering::Relaxed),
            at_capacity: self.stats.at_capacity.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Run everything already queued, then stop
    pub async fn shutdown(&self) {
        self.executor.shutdown().await;
    }
}

fn record(
    stats: &ProjectorStats,
    book_id: &str,
    change: AvailabilityChange,
    result: &Result<AdjustOutcome, CatalogError>,
) {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            ProjectorMetrics::record(change.as_str(), "failed");
            tracing::error!(book_id, change = change.as_str(), error = %e, "Availability update failed");
            return;
        }
    };

    let counter = match outcome {
        AdjustOutcome::Applied {
            available_copies,
            status,
        } => {
            tracing::info!(
                book_id,
                change = change.as_str(),
                available_copies,
                status = %status,
                "Availability updated"
            );
            &stats.applied
        }
        AdjustOutcome::NotFound => {
            tracing::warn!(book_id, change = change.as_str(), "Book not found, availability event skipped");
            &stats.not_found
        }
        AdjustOutcome::NoCopiesAvailable => {
            tracing::warn!(book_id, "No copies left, borrow event skipped");
            &stats.no_copies
        }
        AdjustOutcome::AtCapacity => {
            tracing::warn!(book_id, "All copies already on the shelf, return event skipped");
            &stats.at_capacity
        }
    };
    counter.fetch_add(1, Ordering::Relaxed);
    ProjectorMetrics::record(change.as_str(), outcome.label());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BookStatus, MemoryCatalog, NewBook};

    async fn catalog_with(total: i32, available: i32) -> Arc<MemoryCatalog> {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog
            .insert_book(NewBook {
                book_id: "b-1".into(),
                title: "Cosmos".into(),
                author: "Carl Sagan".into(),
                category: "Science".into(),
                cover_image_url: None,
                total_copies: total,
                available_copies: Some(available),
            })
            .await
            .unwrap();
        catalog
    }

    #[tokio::test]
    async fn test_borrow_then_return_round_trip() {
        let catalog = catalog_with(3, 1).await;
        let projector = AvailabilityProjector::new(catalog.clone(), &ProjectorConfig::default());

        projector.apply("b-1", AvailabilityChange::Borrow).await.unwrap();
        let book = catalog.get_book("b-1").await.unwrap();
        assert_eq!((book.available_copies, book.status), (0, BookStatus::Unavailable));

        projector.apply("b-1", AvailabilityChange::Return).await.unwrap();
        let book = catalog.get_book("b-1").await.unwrap();
        assert_eq!((book.available_copies, book.status), (1, BookStatus::Available));

        let stats = projector.stats();
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.shards, 8);
    }

    #[tokio::test]
    async fn test_skips_are_counted_not_errors() {
        let catalog = catalog_with(1, 0).await;
        let projector = AvailabilityProjector::new(catalog, &ProjectorConfig::default());

        let outcome = projector.apply("b-1", AvailabilityChange::Borrow).await.unwrap();
        assert_eq!(outcome, AdjustOutcome::NoCopiesAvailable);
        let outcome = projector.apply("ghost", AvailabilityChange::Return).await.unwrap();
        assert_eq!(outcome, AdjustOutcome::NotFound);

        let stats = projector.stats();
        assert_eq!(stats.no_copies, 1);
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.applied, 0);
    }

    #[tokio::test]
    async fn test_concurrent_mixed_events_stay_in_bounds() {
        let catalog = catalog_with(3, 2).await;
        let projector = Arc::new(AvailabilityProjector::new(
            catalog.clone(),
            &ProjectorConfig::default(),
        ));

        let mut handles = Vec::new();
        for i in 0..40 {
            let projector = projector.clone();
            let change = if i % 3 == 0 {
                AvailabilityChange::Return
            } else {
                AvailabilityChange::Borrow
            };
            handles.push(tokio::spawn(async move {
                projector.apply("b-1", change).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let book = catalog.get_book("b-1").await.unwrap();
        assert!((0..=3).contains(&book.available_copies));
        assert_eq!(book.status, BookStatus::for_copies(book.available_copies));
    }

    #[tokio::test]
    async fn test_apply_after_shutdown_is_closed() {
        let projector = AvailabilityProjector::new(
            Arc::new(MemoryCatalog::new()),
            &ProjectorConfig::default(),
        );
        projector.shutdown().await;
        let err = projector
            .apply("b-1", AvailabilityChange::Borrow)
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectorError::Closed));
    }
}
