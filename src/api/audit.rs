//! Recent fan-out audit records.

use axum::{
    extract::State,
    Json,
};
use serde::Deserialize;

use super::extract::ApiQuery;
use super::response::ApiResponse;
use crate::notification::FanoutAudit;
use crate::server::AppState;

const DEFAULT_AUDIT_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct AuditParams {
    pub limit: Option<usize>,
}

/// GET /api/v1/audit?limit=
pub async fn recent_fanouts(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<AuditParams>,
) -> Json<ApiResponse<Vec<FanoutAudit>>> {
    let limit = params.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    ApiResponse::ok(state.audit.recent(limit).await)
}
