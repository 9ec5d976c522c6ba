use async_trait::async_trait;
use thiserror::Error;

use super::types::{AdjustOutcome, AvailabilityChange, Book, BookDetailsUpdate, NewBook};
use crate::infrastructure::error::AppError;
use crate::infrastructure::postgres::PostgresPoolError;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Book {0} not found")]
    NotFound(String),

    #[error("Book {0} already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    Validation(String),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt book row: {0}")]
    Corrupt(String),
}

impl From<PostgresPoolError> for CatalogError {
    fn from(err: PostgresPoolError) -> Self {
        match err {
            PostgresPoolError::Sqlx(e) => CatalogError::Database(e),
            other => CatalogError::Unavailable(other.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => AppError::NotFound(err.to_string()),
            CatalogError::AlreadyExists(_) => AppError::Conflict(err.to_string()),
            CatalogError::Validation(msg) => AppError::Validation(msg),
            CatalogError::Unavailable(msg) => AppError::Unavailable(msg),
            CatalogError::Database(e) => AppError::Database(e),
            CatalogError::Corrupt(msg) => AppError::Internal(msg),
        }
    }
}

/// Access to book records owned by the catalog.
///
/// `adjust_availability` is the only way copy counts change and is applied
/// atomically: the count never leaves `0..=total_copies` even under
/// concurrent callers.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn get_book(&self, book_id: &str) -> Result<Book, CatalogError>;

    async fn insert_book(&self, book: NewBook) -> Result<Book, CatalogError>;

    async fn update_details(
        &self,
        book_id: &str,
        update: BookDetailsUpdate,
    ) -> Result<Book, CatalogError>;

    async fn adjust_availability(
        &self,
        book_id: &str,
        change: AvailabilityChange,
    ) -> Result<AdjustOutcome, CatalogError>;

    fn backend(&self) -> &'static str;
}
