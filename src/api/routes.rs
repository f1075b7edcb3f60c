//! API route definitions

use axum::routing::{delete, get};
use axum::Router;

use super::handlers;
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/status", get(handlers::health::status))
        .nest("/api", handler_routes())
        .with_state(state)
}

/// Response handler management
fn handler_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/handlers",
            get(handlers::response_handler::list_handlers)
                .post(handlers::response_handler::create_response_handler),
        )
        .route(
            "/handlers/:id",
            delete(handlers::response_handler::delete_response_handler),
        )
}
