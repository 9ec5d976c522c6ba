use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::Response,
};

use super::AppState;
use crate::infrastructure::error::AppError;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// API key authentication for mutating requests.
/// Reads pass through; writes need `X-API-Key` to match `api.key` when one is
/// configured.
pub async fn api_key_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok(next.run(req).await);
    }

    // No key configured: development mode
    let Some(expected_key) = &state.settings.api.key else {
        return Ok(next.run(req).await);
    };

    let api_key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match api_key {
        Some(key) if key == expected_key => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!(method = %req.method(), path = %req.uri().path(), "Invalid API key provided");
            Err(AppError::Unauthorized("Invalid API key".into()))
        }
        None => {
            tracing::warn!(method = %req.method(), path = %req.uri().path(), "Missing API key header");
            Err(AppError::Unauthorized("Missing X-API-Key header".into()))
        }
    }
}
