//! Health check endpoint

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::api::server::AppState;
use crate::models::StatusResponse;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rewrite-proxy"
        })),
    )
}

/// Uptime and number of active handlers
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: "running".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        handler_count: state.registry.len(),
    })
}
