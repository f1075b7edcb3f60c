//! API server using Axum
//!
//! Provides REST API endpoints for managing the response handlers at runtime.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::ApiServerConfig;
use crate::error::{Result, RewriteError};
use crate::rewrite::HandlerRegistry;

use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<HandlerRegistry>,
    pub started_at: Instant,
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server sharing `registry` with the proxy
    pub fn new(config: ApiServerConfig, registry: Arc<HandlerRegistry>) -> Self {
        let state = AppState {
            registry,
            started_at: Instant::now(),
        };

        Self { config, state }
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        routes::create_router(self.state.clone()).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| RewriteError::InvalidConfig(format!("Invalid API server address: {}", e)))?;

        let router = self.build_router();

        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| RewriteError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::ScriptAddingHandler;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_server() -> (ApiServer, Arc<HandlerRegistry>) {
        let registry = Arc::new(HandlerRegistry::new());
        let config = ApiServerConfig {
            enabled: true,
            port: 0,
            host: "127.0.0.1".to_string(),
        };
        (ApiServer::new(config, registry.clone()), registry)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (server, _) = test_server();
        let response = server
            .build_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "rewrite-proxy");
    }

    #[tokio::test]
    async fn test_status_counts_handlers() {
        let (server, registry) = test_server();
        registry.add(Arc::new(ScriptAddingHandler::new("a()").unwrap()));

        let response = server
            .build_router()
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["handler_count"], 1);
    }

    #[tokio::test]
    async fn test_create_and_list_handlers() {
        let (server, registry) = test_server();
        let router = server.build_router();

        let response = router
            .clone()
            .oneshot(post_json(
                "/api/handlers",
                r#"{"type":"ScriptAddingHttpResponseHandler","params":{"script":["alert(1)"]}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["type"], "ScriptAddingHttpResponseHandler");
        assert_eq!(registry.len(), 1);

        let response = router
            .oneshot(Request::get("/api/handlers").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let listed = json_body(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["id"], created["id"]);
    }

    #[tokio::test]
    async fn test_create_handler_with_bad_params_is_rejected() {
        let (server, registry) = test_server();

        let response = server
            .build_router()
            .oneshot(post_json(
                "/api/handlers",
                r#"{"type":"ScriptAddingHttpResponseHandler","params":{}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_create_unknown_handler_type_is_rejected() {
        let (server, registry) = test_server();

        let response = server
            .build_router()
            .oneshot(post_json("/api/handlers", r#"{"type":"NoSuchHandler"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let (server, registry) = test_server();
        let id = registry.add(Arc::new(ScriptAddingHandler::new("a()").unwrap()));
        let router = server.build_router();

        let delete = |id: String| {
            Request::delete(format!("/api/handlers/{}", id))
                .body(Body::empty())
                .unwrap()
        };

        let response = router.clone().oneshot(delete(id.to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(registry.is_empty());

        let response = router.clone().oneshot(delete(id.to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router.oneshot(delete("not-a-uuid".to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
