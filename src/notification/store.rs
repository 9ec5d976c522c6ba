use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::types::{Notification, NotificationPage, NotificationQuery};
use crate::infrastructure::error::AppError;
use crate::infrastructure::postgres::PostgresPoolError;

#[derive(Debug, Error)]
pub enum NotificationStoreError {
    #[error("Notification {0} not found")]
    NotFound(Uuid),

    #[error("Notification store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt notification row: {0}")]
    Corrupt(String),
}

impl From<PostgresPoolError> for NotificationStoreError {
    fn from(err: PostgresPoolError) -> Self {
        match err {
            PostgresPoolError::Sqlx(e) => NotificationStoreError::Database(e),
            other => NotificationStoreError::Unavailable(other.to_string()),
        }
    }
}

impl From<NotificationStoreError> for AppError {
    fn from(err: NotificationStoreError) -> Self {
        match err {
            NotificationStoreError::NotFound(_) => AppError::NotFound(err.to_string()),
            NotificationStoreError::Unavailable(msg) => AppError::Unavailable(msg),
            NotificationStoreError::Database(e) => AppError::Database(e),
            NotificationStoreError::Corrupt(msg) => AppError::Internal(msg),
        }
    }
}

/// Per-user notification inbox. Expired rows are invisible to readers and
/// removed by [`NotificationStore::purge_expired`].
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Write all rows in one batch; returns the number written
    async fn insert_batch(
        &self,
        notifications: &[Notification],
    ) -> Result<usize, NotificationStoreError>;

    /// Newest first
    async fn list_for_user(
        &self,
        user_id: &str,
        query: NotificationQuery,
    ) -> Result<NotificationPage, NotificationStoreError>;

    async fn unread_count(&self, user_id: &str) -> Result<usize, NotificationStoreError>;

    /// `NotFound` unless the notification exists and belongs to `user_id`
    async fn mark_read(
        &self,
        user_id: &str,
        notification_id: Uuid,
    ) -> Result<Notification, NotificationStoreError>;

    async fn mark_all_read(&self, user_id: &str) -> Result<usize, NotificationStoreError>;

    async fn delete(&self, user_id: &str, notification_id: Uuid)
        -> Result<(), NotificationStoreError>;

    async fn delete_all_for_user(&self, user_id: &str) -> Result<usize, NotificationStoreError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, NotificationStoreError>;

    fn backend(&self) -> &'static str;
}
