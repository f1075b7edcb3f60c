//! Response handler management

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::info;

use crate::api::server::AppState;
use crate::error::RewriteError;
use crate::models::{CreateHandlerRequest, HandlerInfo};
use crate::rewrite::{create_handler, HandlerId};

/// List registered handlers, oldest first
pub async fn list_handlers(State(state): State<AppState>) -> impl IntoResponse {
    let handlers: Vec<HandlerInfo> = state
        .registry
        .list()
        .iter()
        .map(HandlerInfo::from)
        .collect();

    Json(handlers)
}

/// Build a handler through the factory and register it
pub async fn create_response_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateHandlerRequest>,
) -> Result<impl IntoResponse, RewriteError> {
    let handler = create_handler(&req.handler_type, &req.handler_params())?;
    let registration = state.registry.register(Arc::from(handler));

    info!(id = %registration.id, handler_type = %req.handler_type, "Registered response handler");

    Ok((StatusCode::CREATED, Json(HandlerInfo::from(&registration))))
}

/// Unregister a handler
pub async fn delete_response_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RewriteError> {
    let handler_id: HandlerId = id.parse()?;

    if state.registry.remove(&handler_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(RewriteError::NotFound(format!(
            "Handler with id {} not found",
            id
        )))
    }
}
