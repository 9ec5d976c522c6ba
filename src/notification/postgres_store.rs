//! PostgreSQL notification store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::store::{NotificationStore, NotificationStoreError};
use super::types::{Notification, NotificationPage, NotificationQuery};
use crate::infrastructure::metrics::BackendMetrics;
use crate::infrastructure::postgres::PostgresPool;

/// 14 binds per row keeps one statement well under the 65535 parameter limit
const INSERT_CHUNK: usize = 1000;

const COLUMNS: &str = "notification_id, user_id, user_email, type, title, message, \
     related_book_id, related_category_id, metadata, is_read, read_at, priority, \
     created_at, expires_at";

#[derive(sqlx::FromRow)]
struct NotificationRow {
    notification_id: Uuid,
    user_id: String,
    user_email: String,
    #[sqlx(rename = "type")]
    notification_type: String,
    title: String,
    message: String,
    related_book_id: Option<String>,
    related_category_id: Option<String>,
    metadata: serde_json::Value,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    priority: String,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = NotificationStoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            notification_id: row.notification_id,
            user_id: row.user_id,
            user_email: row.user_email,
            notification_type: row
                .notification_type
                .parse()
                .map_err(NotificationStoreError::Corrupt)?,
            title: row.title,
            message: row.message,
            related_book_id: row.related_book_id,
            related_category_id: row.related_category_id,
            metadata: row.metadata,
            is_read: row.is_read,
            read_at: row.read_at,
            priority: row.priority.parse().map_err(NotificationStoreError::Corrupt)?,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

pub struct PostgresNotificationStore {
    pool: PostgresPool,
}

impl PostgresNotificationStore {
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    fn observe<T>(
        operation: &str,
        result: Result<T, NotificationStoreError>,
    ) -> Result<T, NotificationStoreError> {
        if let Err(e) = &result {
            if !matches!(e, NotificationStoreError::NotFound(_)) {
                BackendMetrics::record_error("postgres", operation);
                tracing::error!(operation, error = %e, "Notification store operation failed");
            }
        }
        result
    }
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    async fn insert_batch(
        &self,
        notifications: &[Notification],
    ) -> Result<usize, NotificationStoreError> {
        if notifications.is_empty() {
            return Ok(0);
        }

        let result = self
            .pool
            .run(|pool| async move {
                let mut tx = pool.begin().await?;
                for chunk in notifications.chunks(INSERT_CHUNK) {
                    let mut builder: QueryBuilder<Postgres> =
                        QueryBuilder::new(format!("INSERT INTO notifications ({}) ", COLUMNS));
                    builder.push_values(chunk, |mut row, n| {
                        row.push_bind(n.notification_id)
                            .push_bind(&n.user_id)
                            .push_bind(&n.user_email)
                            .push_bind(n.notification_type.as_str())
                            .push_bind(&n.title)
                            .push_bind(&n.message)
                            .push_bind(&n.related_book_id)
                            .push_bind(&n.related_category_id)
                            .push_bind(&n.metadata)
                            .push_bind(n.is_read)
                            .push_bind(n.read_at)
                            .push_bind(n.priority.as_str())
                            .push_bind(n.created_at)
                            .push_bind(n.expires_at);
                    });
                    builder.build().execute(&mut *tx).await?;
                }
                tx.commit().await?;
                Ok::<_, sqlx::Error>(notifications.len())
            })
            .await
            .map_err(NotificationStoreError::from);
        Self::observe("insert_batch", result)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        query: NotificationQuery,
    ) -> Result<NotificationPage, NotificationStoreError> {
        let sql = format!(
            "SELECT {} FROM notifications \
             WHERE user_id = $1 AND (expires_at IS NULL OR expires_at > NOW()) \
               AND (NOT $2 OR NOT is_read) \
             ORDER BY created_at DESC, notification_id \
             LIMIT $3 OFFSET $4",
            COLUMNS
        );

        let result = self
            .pool
            .run(|pool| async move {
                let rows = sqlx::query_as::<_, NotificationRow>(&sql)
                    .bind(user_id)
                    .bind(query.unread_only)
                    .bind(query.limit as i64)
                    .bind(query.offset as i64)
                    .fetch_all(&pool)
                    .await?;
                let (total, unread): (i64, i64) = sqlx::query_as(
                    "SELECT COUNT(*) FILTER (WHERE NOT $2 OR NOT is_read), \
                            COUNT(*) FILTER (WHERE NOT is_read) \
                     FROM notifications \
                     WHERE user_id = $1 AND (expires_at IS NULL OR expires_at > NOW())",
                )
                .bind(user_id)
                .bind(query.unread_only)
                .fetch_one(&pool)
                .await?;
                Ok::<_, sqlx::Error>((rows, total, unread))
            })
            .await
            .map_err(NotificationStoreError::from)
            .and_then(|(rows, total, unread)| {
                let notifications = rows
                    .into_iter()
                    .map(Notification::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(NotificationPage {
                    notifications,
                    total: total as usize,
                    unread_count: unread as usize,
                    limit: query.limit,
                    offset: query.offset,
                })
            });
        Self::observe("list_for_user", result)
    }

    async fn unread_count(&self, user_id: &str) -> Result<usize, NotificationStoreError> {
        let result = self
            .pool
            .run(|pool| async move {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM notifications \
                     WHERE user_id = $1 AND NOT is_read \
                       AND (expires_at IS NULL OR expires_at > NOW())",
                )
                .bind(user_id)
                .fetch_one(&pool)
                .await
            })
            .await
            .map(|count| count as usize)
            .map_err(NotificationStoreError::from);
        Self::observe("unread_count", result)
    }

    async fn mark_read(
        &self,
        user_id: &str,
        notification_id: Uuid,
    ) -> Result<Notification, NotificationStoreError> {
        let sql = format!(
            "UPDATE notifications SET is_read = TRUE, read_at = COALESCE(read_at, NOW()) \
             WHERE notification_id = $1 AND user_id = $2 \
               AND (expires_at IS NULL OR expires_at > NOW()) \
             RETURNING {}",
            COLUMNS
        );
        let result = self
            .pool
            .run(|pool| async move {
                sqlx::query_as::<_, NotificationRow>(&sql)
                    .bind(notification_id)
                    .bind(user_id)
                    .fetch_optional(&pool)
                    .await
            })
            .await
            .map_err(NotificationStoreError::from)
            .and_then(|row| {
                row.ok_or(NotificationStoreError::NotFound(notification_id))?
                    .try_into()
            });
        Self::observe("mark_read", result)
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<usize, NotificationStoreError> {
        let result = self
            .pool
            .run(|pool| async move {
                sqlx::query(
                    "UPDATE notifications SET is_read = TRUE, read_at = NOW() \
                     WHERE user_id = $1 AND NOT is_read \
                       AND (expires_at IS NULL OR expires_at > NOW())",
                )
                .bind(user_id)
                .execute(&pool)
                .await
            })
            .await
            .map(|done| done.rows_affected() as usize)
            .map_err(NotificationStoreError::from);
        Self::observe("mark_all_read", result)
    }

    async fn delete(
        &self,
        user_id: &str,
        notification_id: Uuid,
    ) -> Result<(), NotificationStoreError> {
        let result = self
            .pool
            .run(|pool| async move {
                sqlx::query("DELETE FROM notifications WHERE notification_id = $1 AND user_id = $2")
                    .bind(notification_id)
                    .bind(user_id)
                    .execute(&pool)
                    .await
            })
            .await
            .map_err(NotificationStoreError::from)
            .and_then(|done| match done.rows_affected() {
                0 => Err(NotificationStoreError::NotFound(notification_id)),
                _ => Ok(()),
            });
        Self::observe("delete", result)
    }

    async fn delete_all_for_user(&self, user_id: &str) -> Result<usize, NotificationStoreError> {
        let result = self
            .pool
            .run(|pool| async move {
                sqlx::query("DELETE FROM notifications WHERE user_id = $1")
                    .bind(user_id)
                    .execute(&pool)
                    .await
            })
            .await
            .map(|done| done.rows_affected() as usize)
            .map_err(NotificationStoreError::from);
        Self::observe("delete_all_for_user", result)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, NotificationStoreError> {
        let result = self
            .pool
            .run(|pool| async move {
                sqlx::query("DELETE FROM notifications WHERE expires_at IS NOT NULL AND expires_at <= $1")
                    .bind(now)
                    .execute(&pool)
                    .await
            })
            .await
            .map(|done| done.rows_affected() as usize)
            .map_err(NotificationStoreError::from);
        Self::observe("purge_expired", result)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{NotificationType, Priority};

    #[test]
    fn test_row_conversion_rejects_unknown_type() {
        let row = NotificationRow {
            notification_id: Uuid::new_v4(),
            user_id: "u-1".into(),
            user_email: "u@example.com".into(),
            notification_type: "BOOK_LOST".into(),
            title: "t".into(),
            message: "m".into(),
            related_book_id: None,
            related_category_id: None,
            metadata: serde_json::json!({}),
            is_read: false,
            read_at: None,
            priority: "Normal".into(),
            created_at: Utc::now(),
            expires_at: None,
        };
        assert!(matches!(
            Notification::try_from(row),
            Err(NotificationStoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_row_conversion() {
        let row = NotificationRow {
            notification_id: Uuid::new_v4(),
            user_id: "u-1".into(),
            user_email: "u@example.com".into(),
            notification_type: "BOOK_RETURNED".into(),
            title: "t".into(),
            message: "m".into(),
            related_book_id: Some("b-1".into()),
            related_category_id: None,
            metadata: serde_json::json!({"borrowId": "br-1"}),
            is_read: true,
            read_at: Some(Utc::now()),
            priority: "High".into(),
            created_at: Utc::now(),
            expires_at: None,
        };
        let notification = Notification::try_from(row).unwrap();
        assert_eq!(notification.notification_type, NotificationType::BookReturned);
        assert_eq!(notification.priority, Priority::High);
    }
}
