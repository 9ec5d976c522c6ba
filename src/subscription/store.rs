use async_trait::async_trait;
use thiserror::Error;

use super::types::{
    BookSubscription, CategorySubscription, SubscriberProfile, Subscribed, SubscriptionKey,
    SubscriptionTarget, UserSubscriptions,
};
use crate::infrastructure::error::AppError;
use crate::infrastructure::postgres::PostgresPoolError;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Already subscribed to {0}")]
    Conflict(String),

    #[error("No subscription to {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Subscription store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<PostgresPoolError> for SubscriptionError {
    fn from(err: PostgresPoolError) -> Self {
        match err {
            PostgresPoolError::Sqlx(e) => SubscriptionError::Database(e),
            other => SubscriptionError::Unavailable(other.to_string()),
        }
    }
}

impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::Conflict(_) => AppError::Conflict(err.to_string()),
            SubscriptionError::NotFound(_) => AppError::NotFound(err.to_string()),
            SubscriptionError::Validation(msg) => AppError::Validation(msg),
            SubscriptionError::Unavailable(msg) => AppError::Unavailable(msg),
            SubscriptionError::Database(e) => AppError::Database(e),
        }
    }
}

/// The user↔category and user↔book relations.
///
/// Rows are never removed; unsubscribing flips `is_active` and subscribing
/// again reactivates the same row.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Create, or reactivate, the (user, target) row. `Conflict` when it is
    /// already active.
    async fn subscribe(
        &self,
        profile: &SubscriberProfile,
        target: &SubscriptionTarget,
    ) -> Result<Subscribed, SubscriptionError>;

    /// Soft delete. `NotFound` when no active row exists.
    async fn unsubscribe(&self, user_id: &str, key: &SubscriptionKey)
        -> Result<(), SubscriptionError>;

    async fn list_for_user(&self, user_id: &str) -> Result<UserSubscriptions, SubscriptionError>;

    /// Active subscribers whose category name equals `category_name`, ignoring case
    async fn list_category_subscribers(
        &self,
        category_name: &str,
    ) -> Result<Vec<CategorySubscription>, SubscriptionError>;

    async fn list_book_subscribers(
        &self,
        book_id: &str,
    ) -> Result<Vec<BookSubscription>, SubscriptionError>;

    /// Soft delete every active row of the user in both relations
    async fn deactivate_all_for_user(&self, user_id: &str) -> Result<usize, SubscriptionError>;

    fn backend(&self) -> &'static str;
}
