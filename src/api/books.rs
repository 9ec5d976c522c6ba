//! Catalog producer endpoints. Each write commits to the catalog first and
//! then publishes the matching event best-effort.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::extract::ApiJson;
use super::response::ApiResponse;
use crate::catalog::{Book, BookDetailsUpdate, NewBook};
use crate::channel::{CatalogEvent, DomainEvent, Topic};
use crate::infrastructure::error::Result;
use crate::server::AppState;

fn catalog_event(topic: Topic, book: &Book) -> DomainEvent {
    let event = CatalogEvent::new(topic, book.event_data());
    match topic {
        Topic::BookUpdated => DomainEvent::BookUpdated(event),
        _ => DomainEvent::BookAdded(event),
    }
}

/// POST /api/v1/books
#[tracing::instrument(name = "http.add_book", skip(state, book), fields(book_id = %book.book_id))]
pub async fn add_book(
    State(state): State<AppState>,
    ApiJson(book): ApiJson<NewBook>,
) -> Result<(StatusCode, Json<ApiResponse<Book>>)> {
    let catalog = state.catalog.clone();
    let book = state
        .publisher
        .commit_then_publish(
            || async move { catalog.insert_book(book).await },
            |book| catalog_event(Topic::BookAdded, book),
        )
        .await?;

    Ok(ApiResponse::created(book))
}

/// PUT /api/v1/books/{bookId}
#[tracing::instrument(name = "http.update_book", skip(state, update))]
pub async fn update_book(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    ApiJson(update): ApiJson<BookDetailsUpdate>,
) -> Result<Json<ApiResponse<Book>>> {
    let catalog = state.catalog.clone();
    let book = state
        .publisher
        .commit_then_publish(
            || async move { catalog.update_details(&book_id, update).await },
            |book| catalog_event(Topic::BookUpdated, book),
        )
        .await?;

    Ok(ApiResponse::ok(book))
}

/// GET /api/v1/books/{bookId}
pub async fn get_book(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Json<ApiResponse<Book>>> {
    let book = state.catalog.get_book(&book_id).await?;
    Ok(ApiResponse::ok(book))
}
