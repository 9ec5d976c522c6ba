//! Per-user notification inbox endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::extract::ApiQuery;
use super::response::ApiResponse;
use crate::infrastructure::error::{AppError, Result};
use crate::notification::{Notification, NotificationPage, NotificationQuery};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub unread_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedRead {
    pub updated: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deleted {
    pub id: Uuid,
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| AppError::Validation(format!("Invalid notification id: {}", raw)))
}

/// GET /api/v1/users/{userId}/notifications
#[tracing::instrument(name = "http.list_notifications", skip(state, params))]
pub async fn list_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<ApiResponse<NotificationPage>>> {
    let query = NotificationQuery::new(params.unread_only, params.limit, params.offset);
    let page = state.notifications.list_for_user(&user_id, query).await?;
    Ok(ApiResponse::ok(page))
}

/// GET /api/v1/users/{userId}/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<UnreadCount>>> {
    let unread_count = state.notifications.unread_count(&user_id).await?;
    Ok(ApiResponse::ok(UnreadCount { unread_count }))
}

/// PATCH /api/v1/users/{userId}/notifications/{id}/read
#[tracing::instrument(name = "http.mark_read", skip(state))]
pub async fn mark_read(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Notification>>> {
    let id = parse_id(&id)?;
    let notification = state.notifications.mark_read(&user_id, id).await?;
    Ok(ApiResponse::ok(notification))
}

/// PATCH /api/v1/users/{userId}/notifications/read-all
#[tracing::instrument(name = "http.mark_all_read", skip(state))]
pub async fn mark_all_read(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<MarkedRead>>> {
    let updated = state.notifications.mark_all_read(&user_id).await?;
    Ok(ApiResponse::ok(MarkedRead { updated }))
}

/// DELETE /api/v1/users/{userId}/notifications/{id}
#[tracing::instrument(name = "http.delete_notification", skip(state))]
pub async fn delete_notification(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Deleted>>> {
    let id = parse_id(&id)?;
    state.notifications.delete(&user_id, id).await?;
    Ok(ApiResponse::ok(Deleted { id }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert!(parse_id("not-a-uuid").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }
}
