//! Prometheus metrics endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::infrastructure::metrics::{self, PUSH_CONNECTIONS, REDIS_CIRCUIT_BREAKER_STATE};
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    update_metrics_from_state(&state);

    match metrics::encode_metrics() {
        Ok(output) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Gauges that are read from state rather than updated on the hot path
fn update_metrics_from_state(state: &AppState) {
    PUSH_CONNECTIONS.set(state.push.len() as i64);

    if let Some(pool) = &state.redis_pool {
        REDIS_CIRCUIT_BREAKER_STATE.set(pool.circuit_breaker().state() as i64);
    }
}
