//! Subscription endpoints and the targeting preview.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::extract::{ApiJson, ApiQuery};
use super::response::ApiResponse;
use crate::infrastructure::error::{AppError, Result};
use crate::server::AppState;
use crate::subscription::{
    BookSubscription, CategorySubscription, SubscribeTransition, Subscribed, SubscriberProfile,
    SubscriptionKey, SubscriptionTarget, UserSubscriptions,
};
use crate::targeting::TargetedSubscriber;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySubscribeRequest {
    pub category_id: String,
    pub category_name: String,
    pub user_email: String,
    pub user_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSubscribeRequest {
    pub book_id: String,
    pub book_title: String,
    pub user_email: String,
    pub user_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Unsubscribed {
    pub user_id: String,
    pub target: String,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetsQuery {
    pub category: Option<String>,
    pub book_id: Option<String>,
}

fn profile(user_id: String, user_email: String, user_name: String) -> SubscriberProfile {
    SubscriberProfile {
        user_id,
        user_email,
        user_name,
    }
}

fn subscribed_status(subscribed: &Subscribed) -> StatusCode {
    match subscribed.transition {
        SubscribeTransition::Create => StatusCode::CREATED,
        _ => StatusCode::OK,
    }
}

/// GET /api/v1/users/{userId}/subscriptions
#[tracing::instrument(name = "http.list_subscriptions", skip(state))]
pub async fn list_user_subscriptions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<UserSubscriptions>>> {
    let subscriptions = state.subscriptions.list_for_user(&user_id).await?;
    Ok(ApiResponse::ok(subscriptions))
}

/// POST /api/v1/users/{userId}/subscriptions/categories
#[tracing::instrument(
    name = "http.subscribe_category",
    skip(state, request),
    fields(category_id = %request.category_id)
)]
pub async fn subscribe_category(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ApiJson(request): ApiJson<CategorySubscribeRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Subscribed>>)> {
    let profile = profile(user_id, request.user_email, request.user_name);
    let target = SubscriptionTarget::Category {
        category_id: request.category_id,
        category_name: request.category_name,
    };

    let subscribed = state.subscriptions.subscribe(&profile, &target).await?;
    Ok((subscribed_status(&subscribed), ApiResponse::ok(subscribed)))
}

/// DELETE /api/v1/users/{userId}/subscriptions/categories/{categoryId}
#[tracing::instrument(name = "http.unsubscribe_category", skip(state))]
pub async fn unsubscribe_category(
    State(state): State<AppState>,
    Path((user_id, category_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Unsubscribed>>> {
    let key = SubscriptionKey::Category(category_id);
    state.subscriptions.unsubscribe(&user_id, &key).await?;
    Ok(ApiResponse::ok(Unsubscribed {
        user_id,
        target: key.describe(),
        is_active: false,
    }))
}

/// POST /api/v1/users/{userId}/subscriptions/books
#[tracing::instrument(
    name = "http.subscribe_book",
    skip(state, request),
    fields(book_id = %request.book_id)
)]
pub async fn subscribe_book(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ApiJson(request): ApiJson<BookSubscribeRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Subscribed>>)> {
    let profile = profile(user_id, request.user_email, request.user_name);
    let target = SubscriptionTarget::Book {
        book_id: request.book_id,
        book_title: request.book_title,
    };

    let subscribed = state.subscriptions.subscribe(&profile, &target).await?;
    Ok((subscribed_status(&subscribed), ApiResponse::ok(subscribed)))
}

/// DELETE /api/v1/users/{userId}/subscriptions/books/{bookId}
#[tracing::instrument(name = "http.unsubscribe_book", skip(state))]
pub async fn unsubscribe_book(
    State(state): State<AppState>,
    Path((user_id, book_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Unsubscribed>>> {
    let key = SubscriptionKey::Book(book_id);
    state.subscriptions.unsubscribe(&user_id, &key).await?;
    Ok(ApiResponse::ok(Unsubscribed {
        user_id,
        target: key.describe(),
        is_active: false,
    }))
}

/// GET /api/v1/categories/{categoryName}/subscribers
#[tracing::instrument(name = "http.category_subscribers", skip(state))]
pub async fn category_subscribers(
    State(state): State<AppState>,
    Path(category_name): Path<String>,
) -> Result<Json<ApiResponse<Vec<CategorySubscription>>>> {
    let subscribers = state
        .subscriptions
        .list_category_subscribers(&category_name)
        .await?;
    Ok(ApiResponse::ok(subscribers))
}

/// GET /api/v1/books/{bookId}/subscribers
#[tracing::instrument(name = "http.book_subscribers", skip(state))]
pub async fn book_subscribers(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<BookSubscription>>>> {
    let subscribers = state.subscriptions.list_book_subscribers(&book_id).await?;
    Ok(ApiResponse::ok(subscribers))
}

/// GET /api/v1/targets?category=&bookId=
#[tracing::instrument(name = "http.preview_targets", skip(state, query))]
pub async fn preview_targets(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TargetsQuery>,
) -> Result<Json<ApiResponse<Vec<TargetedSubscriber>>>> {
    let category = query
        .category
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::Validation("category is required".into()))?;
    let book_id = query.book_id.filter(|b| !b.trim().is_empty());

    let targets = state.resolver.resolve(&category, book_id.as_deref()).await?;
    Ok(ApiResponse::ok(targets))
}
