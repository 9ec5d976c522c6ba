//! PostgreSQL catalog.
//!
//! Availability changes are single guarded UPDATE statements, so the database
//! row lock serializes concurrent writers and the bounds are checked in the
//! same statement that writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::client::{CatalogClient, CatalogError};
use super::types::{
    AdjustOutcome, AvailabilityChange, Book, BookDetailsUpdate, BookStatus, NewBook,
};
use crate::infrastructure::metrics::BackendMetrics;
use crate::infrastructure::postgres::PostgresPool;

const COLUMNS: &str = "book_id, title, author, category, cover_image_url, total_copies, \
     available_copies, status, updated_at";

const BORROW_SQL: &str = "UPDATE books SET \
         available_copies = available_copies - 1, \
         status = CASE WHEN available_copies - 1 > 0 THEN 'available' ELSE 'unavailable' END, \
         updated_at = NOW() \
     WHERE book_id = $1 AND available_copies > 0 \
     RETURNING available_copies, status";

const RETURN_SQL: &str = "UPDATE books SET \
         available_copies = available_copies + 1, \
         status = 'available', \
         updated_at = NOW() \
     WHERE book_id = $1 AND available_copies < total_copies \
     RETURNING available_copies, status";

#[derive(sqlx::FromRow)]
struct BookRow {
    book_id: String,
    title: String,
    author: String,
    category: String,
    cover_image_url: Option<String>,
    total_copies: i32,
    available_copies: i32,
    status: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookRow> for Book {
    type Error = CatalogError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        Ok(Self {
            book_id: row.book_id,
            title: row.title,
            author: row.author,
            category: row.category,
            cover_image_url: row.cover_image_url,
            total_copies: row.total_copies,
            available_copies: row.available_copies,
            status: row.status.parse().map_err(CatalogError::Corrupt)?,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AdjustedRow {
    available_copies: i32,
    status: String,
}

pub struct PostgresCatalog {
    pool: PostgresPool,
}

impl PostgresCatalog {
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    fn observe<T>(operation: &str, result: Result<T, CatalogError>) -> Result<T, CatalogError> {
        if let Err(e) = &result {
            if !matches!(
                e,
                CatalogError::NotFound(_)
                    | CatalogError::AlreadyExists(_)
                    | CatalogError::Validation(_)
            ) {
                BackendMetrics::record_error("postgres", operation);
                tracing::error!(operation, error = %e, "Catalog operation failed");
            }
        }
        result
    }

    /// Tell apart a missing book from a guarded update that matched nothing
    async fn exists(&self, book_id: &str) -> Result<bool, CatalogError> {
        let found = self
            .pool
            .run(|pool| async move {
                sqlx::query_scalar::<_, i32>("SELECT 1 FROM books WHERE book_id = $1")
                    .bind(book_id)
                    .fetch_optional(&pool)
                    .await
            })
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl CatalogClient for PostgresCatalog {
    async fn get_book(&self, book_id: &str) -> Result<Book, CatalogError> {
        let sql = format!("SELECT {} FROM books WHERE book_id = $1", COLUMNS);
        let result: Result<Book, CatalogError> = async {
            let row = self
                .pool
                .run(|pool| async move {
                    sqlx::query_as::<_, BookRow>(&sql)
                        .bind(book_id)
                        .fetch_optional(&pool)
                        .await
                })
                .await?;
            row.ok_or_else(|| CatalogError::NotFound(book_id.to_string()))?
                .try_into()
        }
        .await;
        Self::observe("get_book", result)
    }

    async fn insert_book(&self, book: NewBook) -> Result<Book, CatalogError> {
        book.validate().map_err(CatalogError::Validation)?;

        let book_id = book.book_id.clone();
        let book = book.into_book();
        let sql = format!(
            "INSERT INTO books ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (book_id) DO NOTHING RETURNING {cols}",
            cols = COLUMNS
        );
        let result: Result<Book, CatalogError> = async {
            let row = self
                .pool
                .run(|pool| async move {
                    sqlx::query_as::<_, BookRow>(&sql)
                        .bind(&book.book_id)
                        .bind(&book.title)
                        .bind(&book.author)
                        .bind(&book.category)
                        .bind(&book.cover_image_url)
                        .bind(book.total_copies)
                        .bind(book.available_copies)
                        .bind(book.status.as_str())
                        .bind(book.updated_at)
                        .fetch_optional(&pool)
                        .await
                })
                .await?;
            row.ok_or(CatalogError::AlreadyExists(book_id))?.try_into()
        }
        .await;
        Self::observe("insert_book", result)
    }

    async fn update_details(
        &self,
        book_id: &str,
        update: BookDetailsUpdate,
    ) -> Result<Book, CatalogError> {
        update.validate().map_err(CatalogError::Validation)?;

        let sql = format!(
            "UPDATE books SET \
                 title = COALESCE($2, title), \
                 author = COALESCE($3, author), \
                 category = COALESCE($4, category), \
                 cover_image_url = COALESCE($5, cover_image_url), \
                 updated_at = NOW() \
             WHERE book_id = $1 RETURNING {}",
            COLUMNS
        );
        let result: Result<Book, CatalogError> = async {
            let row = self
                .pool
                .run(|pool| async move {
                    sqlx::query_as::<_, BookRow>(&sql)
                        .bind(book_id)
                        .bind(&update.title)
                        .bind(&update.author)
                        .bind(&update.category)
                        .bind(&update.cover_image_url)
                        .fetch_optional(&pool)
                        .await
                })
                .await?;
            row.ok_or_else(|| CatalogError::NotFound(book_id.to_string()))?
                .try_into()
        }
        .await;
        Self::observe("update_details", result)
    }

    async fn adjust_availability(
        &self,
        book_id: &str,
        change: AvailabilityChange,
    ) -> Result<AdjustOutcome, CatalogError> {
        let sql = match change {
            AvailabilityChange::Borrow => BORROW_SQL,
            AvailabilityChange::Return => RETURN_SQL,
        };
        let result: Result<AdjustOutcome, CatalogError> = async {
            let row = self
                .pool
                .run(|pool| async move {
                    sqlx::query_as::<_, AdjustedRow>(sql)
                        .bind(book_id)
                        .fetch_optional(&pool)
                        .await
                })
                .await?;

            match row {
                Some(row) => {
                    let status: BookStatus = row.status.parse().map_err(CatalogError::Corrupt)?;
                    Ok(AdjustOutcome::Applied {
                        available_copies: row.available_copies,
                        status,
                    })
                }
                None => {
                    if !self.exists(book_id).await? {
                        return Ok(AdjustOutcome::NotFound);
                    }
                    Ok(match change {
                        AvailabilityChange::Borrow => AdjustOutcome::NoCopiesAvailable,
                        AvailabilityChange::Return => AdjustOutcome::AtCapacity,
                    })
                }
            }
        }
        .await;
        Self::observe("adjust_availability", result)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
