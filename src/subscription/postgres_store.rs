//! PostgreSQL subscription store.
//!
//! Subscribe is a single `INSERT … ON CONFLICT … DO UPDATE … WHERE NOT is_active`:
//! the row is created, reactivated, or left alone (no row returned, so the
//! subscription was already active) without a read-then-write race.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::store::{SubscriptionError, SubscriptionStore};
use super::types::{
    BookSubscription, CategorySubscription, SubscribeTransition, SubscriberProfile, Subscribed,
    Subscription, SubscriptionKey, SubscriptionTarget, UserSubscriptions,
};
use crate::infrastructure::metrics::BackendMetrics;
use crate::infrastructure::postgres::PostgresPool;

const CATEGORY_COLUMNS: &str = "id, user_id, category_id, category_name, user_email, user_name, \
     is_active, subscribed_at, unsubscribed_at";
const BOOK_COLUMNS: &str = "id, user_id, book_id, book_title, user_email, user_name, \
     is_active, subscribed_at, unsubscribed_at";

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    user_id: String,
    category_id: String,
    category_name: String,
    user_email: String,
    user_name: String,
    is_active: bool,
    subscribed_at: DateTime<Utc>,
    unsubscribed_at: Option<DateTime<Utc>>,
}

impl From<CategoryRow> for CategorySubscription {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            category_id: row.category_id,
            category_name: row.category_name,
            user_email: row.user_email,
            user_name: row.user_name,
            is_active: row.is_active,
            subscribed_at: row.subscribed_at,
            unsubscribed_at: row.unsubscribed_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookRow {
    id: Uuid,
    user_id: String,
    book_id: String,
    book_title: String,
    user_email: String,
    user_name: String,
    is_active: bool,
    subscribed_at: DateTime<Utc>,
    unsubscribed_at: Option<DateTime<Utc>>,
}

impl From<BookRow> for BookSubscription {
    fn from(row: BookRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            book_id: row.book_id,
            book_title: row.book_title,
            user_email: row.user_email,
            user_name: row.user_name,
            is_active: row.is_active,
            subscribed_at: row.subscribed_at,
            unsubscribed_at: row.unsubscribed_at,
        }
    }
}

/// Upsert results: the row plus whether Postgres inserted it (`xmax = 0`)
#[derive(sqlx::FromRow)]
struct UpsertedCategory {
    #[sqlx(flatten)]
    row: CategoryRow,
    inserted: bool,
}

#[derive(sqlx::FromRow)]
struct UpsertedBook {
    #[sqlx(flatten)]
    row: BookRow,
    inserted: bool,
}

pub struct PostgresSubscriptionStore {
    pool: PostgresPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    fn transition(inserted: bool) -> SubscribeTransition {
        if inserted {
            SubscribeTransition::Create
        } else {
            SubscribeTransition::Reactivate
        }
    }

    fn record_error<T>(
        operation: &str,
        result: Result<T, SubscriptionError>,
    ) -> Result<T, SubscriptionError> {
        if let Err(e) = &result {
            if !matches!(
                e,
                SubscriptionError::Conflict(_)
                    | SubscriptionError::NotFound(_)
                    | SubscriptionError::Validation(_)
            ) {
                BackendMetrics::record_error("postgres", operation);
                tracing::error!(operation, error = %e, "Subscription store operation failed");
            }
        }
        result
    }

    async fn subscribe_category(
        &self,
        profile: &SubscriberProfile,
        category_id: &str,
        category_name: &str,
    ) -> Result<Option<UpsertedCategory>, SubscriptionError> {
        let sql = format!(
            "INSERT INTO category_subscriptions \
                 (id, user_id, category_id, category_name, user_email, user_name, is_active, subscribed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7) \
             ON CONFLICT (user_id, category_id) DO UPDATE SET \
                 category_name = EXCLUDED.category_name, \
                 user_email = EXCLUDED.user_email, \
                 user_name = EXCLUDED.user_name, \
                 is_active = TRUE, \
                 subscribed_at = EXCLUDED.subscribed_at, \
                 unsubscribed_at = NULL \
             WHERE NOT category_subscriptions.is_active \
             RETURNING {}, (xmax = 0) AS inserted",
            CATEGORY_COLUMNS
        );
        let row = self
            .pool
            .run(|pool| async move {
                sqlx::query_as::<_, UpsertedCategory>(&sql)
                    .bind(Uuid::new_v4())
                    .bind(&profile.user_id)
                    .bind(category_id)
                    .bind(category_name)
                    .bind(&profile.user_email)
                    .bind(&profile.user_name)
                    .bind(Utc::now())
                    .fetch_optional(&pool)
                    .await
            })
            .await?;
        Ok(row)
    }

    async fn subscribe_book(
        &self,
        profile: &SubscriberProfile,
        book_id: &str,
        book_title: &str,
    ) -> Result<Option<UpsertedBook>, SubscriptionError> {
        let sql = format!(
            "INSERT INTO book_subscriptions \
                 (id, user_id, book_id, book_title, user_email, user_name, is_active, subscribed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7) \
             ON CONFLICT (user_id, book_id) DO UPDATE SET \
                 book_title = EXCLUDED.book_title, \
                 user_email = EXCLUDED.user_email, \
                 user_name = EXCLUDED.user_name, \
                 is_active = TRUE, \
                 subscribed_at = EXCLUDED.subscribed_at, \
                 unsubscribed_at = NULL \
             WHERE NOT book_subscriptions.is_active \
             RETURNING {}, (xmax = 0) AS inserted",
            BOOK_COLUMNS
        );
        let row = self
            .pool
            .run(|pool| async move {
                sqlx::query_as::<_, UpsertedBook>(&sql)
                    .bind(Uuid::new_v4())
                    .bind(&profile.user_id)
                    .bind(book_id)
                    .bind(book_title)
                    .bind(&profile.user_email)
                    .bind(&profile.user_name)
                    .bind(Utc::now())
                    .fetch_optional(&pool)
                    .await
            })
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn subscribe(
        &self,
        profile: &SubscriberProfile,
        target: &SubscriptionTarget,
    ) -> Result<Subscribed, SubscriptionError> {
        profile.validate()?;
        target.validate()?;

        let result = match target {
            SubscriptionTarget::Category {
                category_id,
                category_name,
            } => self
                .subscribe_category(profile, category_id, category_name)
                .await
                .and_then(|row| {
                    let row = row
                        .ok_or_else(|| SubscriptionError::Conflict(target.key().describe()))?;
                    Ok(Subscribed {
                        transition: Self::transition(row.inserted),
                        subscription: Subscription::Category(row.row.into()),
                    })
                }),
            SubscriptionTarget::Book {
                book_id,
                book_title,
            } => self
                .subscribe_book(profile, book_id, book_title)
                .await
                .and_then(|row| {
                    let row = row
                        .ok_or_else(|| SubscriptionError::Conflict(target.key().describe()))?;
                    Ok(Subscribed {
                        transition: Self::transition(row.inserted),
                        subscription: Subscription::Book(row.row.into()),
                    })
                }),
        };
        Self::record_error("subscribe", result)
    }

    async fn unsubscribe(
        &self,
        user_id: &str,
        key: &SubscriptionKey,
    ) -> Result<(), SubscriptionError> {
        let (sql, id) = match key {
            SubscriptionKey::Category(id) => (
                "UPDATE category_subscriptions SET is_active = FALSE, unsubscribed_at = $3 \
                 WHERE user_id = $1 AND category_id = $2 AND is_active",
                id,
            ),
            SubscriptionKey::Book(id) => (
                "UPDATE book_subscriptions SET is_active = FALSE, unsubscribed_at = $3 \
                 WHERE user_id = $1 AND book_id = $2 AND is_active",
                id,
            ),
        };

        let result = self
            .pool
            .run(|pool| async move {
                sqlx::query(sql)
                    .bind(user_id)
                    .bind(id)
                    .bind(Utc::now())
                    .execute(&pool)
                    .await
            })
            .await
            .map_err(SubscriptionError::from)
            .and_then(|done| {
                if done.rows_affected() == 0 {
                    Err(SubscriptionError::NotFound(key.describe()))
                } else {
                    Ok(())
                }
            });
        Self::record_error("unsubscribe", result)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<UserSubscriptions, SubscriptionError> {
        let category_sql = format!(
            "SELECT {} FROM category_subscriptions WHERE user_id = $1 AND is_active \
             ORDER BY subscribed_at, id",
            CATEGORY_COLUMNS
        );
        let book_sql = format!(
            "SELECT {} FROM book_subscriptions WHERE user_id = $1 AND is_active \
             ORDER BY subscribed_at, id",
            BOOK_COLUMNS
        );

        let result = self
            .pool
            .run(|pool| async move {
                let categories = sqlx::query_as::<_, CategoryRow>(&category_sql)
                    .bind(user_id)
                    .fetch_all(&pool)
                    .await?;
                let books = sqlx::query_as::<_, BookRow>(&book_sql)
                    .bind(user_id)
                    .fetch_all(&pool)
                    .await?;
                Ok::<_, sqlx::Error>(UserSubscriptions {
                    categories: categories.into_iter().map(Into::into).collect(),
                    books: books.into_iter().map(Into::into).collect(),
                })
            })
            .await
            .map_err(SubscriptionError::from);
        Self::record_error("list_for_user", result)
    }

    async fn list_category_subscribers(
        &self,
        category_name: &str,
    ) -> Result<Vec<CategorySubscription>, SubscriptionError> {
        let sql = format!(
            "SELECT {} FROM category_subscriptions \
             WHERE LOWER(category_name) = LOWER($1) AND is_active \
             ORDER BY subscribed_at, id",
            CATEGORY_COLUMNS
        );
        let result = self
            .pool
            .run(|pool| async move {
                sqlx::query_as::<_, CategoryRow>(&sql)
                    .bind(category_name)
                    .fetch_all(&pool)
                    .await
            })
            .await
            .map(|rows| rows.into_iter().map(Into::into).collect())
            .map_err(SubscriptionError::from);
        Self::record_error("list_category_subscribers", result)
    }

    async fn list_book_subscribers(
        &self,
        book_id: &str,
    ) -> Result<Vec<BookSubscription>, SubscriptionError> {
        let sql = format!(
            "SELECT {} FROM book_subscriptions WHERE book_id = $1 AND is_active \
             ORDER BY subscribed_at, id",
            BOOK_COLUMNS
        );
        let result = self
            .pool
            .run(|pool| async move {
                sqlx::query_as::<_, BookRow>(&sql)
                    .bind(book_id)
                    .fetch_all(&pool)
                    .await
            })
            .await
            .map(|rows| rows.into_iter().map(Into::into).collect())
            .map_err(SubscriptionError::from);
        Self::record_error("list_book_subscribers", result)
    }

    async fn deactivate_all_for_user(&self, user_id: &str) -> Result<usize, SubscriptionError> {
        let result = self
            .pool
            .run(|pool| async move {
                let now = Utc::now();
                let mut tx = pool.begin().await?;
                let categories = sqlx::query(
                    "UPDATE category_subscriptions SET is_active = FALSE, unsubscribed_at = $2 \
                     WHERE user_id = $1 AND is_active",
                )
                .bind(user_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                let books = sqlx::query(
                    "UPDATE book_subscriptions SET is_active = FALSE, unsubscribed_at = $2 \
                     WHERE user_id = $1 AND is_active",
                )
                .bind(user_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok::<_, sqlx::Error>((categories.rows_affected() + books.rows_affected()) as usize)
            })
            .await
            .map_err(SubscriptionError::from);
        Self::record_error("deactivate_all_for_user", result)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
