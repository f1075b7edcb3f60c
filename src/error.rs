use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the rewrite proxy
#[derive(Error, Debug)]
pub enum RewriteError {
    // Pipeline errors
    #[error("{coding} codec failure: {source}")]
    Codec {
        coding: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Charset error: {0}")]
    Charset(String),

    #[error("Invalid handler configuration: {0}")]
    InvalidConfiguration(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Proxy errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream request failed: {0}")]
    UpstreamFailed(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Not found: {0}")]
    NotFound(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for rewrite proxy operations
pub type Result<T> = std::result::Result<T, RewriteError>;

impl RewriteError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            RewriteError::InvalidRequest(_)
            | RewriteError::InvalidConfiguration(_)
            | RewriteError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 404 Not Found
            RewriteError::NotFound(_) => StatusCode::NOT_FOUND,

            // 502 Bad Gateway
            RewriteError::UpstreamFailed(_) => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            RewriteError::Timeout => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            RewriteError::Codec { .. }
            | RewriteError::Charset(_)
            | RewriteError::Io(_)
            | RewriteError::Http(_)
            | RewriteError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Whether the rewrite can be abandoned in favor of the original body
    pub fn is_recoverable_rewrite_failure(&self) -> bool {
        matches!(self, RewriteError::Codec { .. } | RewriteError::Charset(_))
    }
}

// Implement IntoResponse for API error responses
impl IntoResponse for RewriteError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

// Convert from hyper errors
impl From<hyper::Error> for RewriteError {
    fn from(err: hyper::Error) -> Self {
        RewriteError::Http(err.to_string())
    }
}

impl From<http::Error> for RewriteError {
    fn from(err: http::Error) -> Self {
        RewriteError::Http(err.to_string())
    }
}

// Patterns are only compiled while building handlers
impl From<regex::Error> for RewriteError {
    fn from(err: regex::Error) -> Self {
        RewriteError::InvalidConfiguration(format!("invalid pattern: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_code_mapping() {
        assert_eq!(
            RewriteError::InvalidRequest("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RewriteError::InvalidConfiguration("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RewriteError::NotFound("handler".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RewriteError::UpstreamFailed("refused".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            RewriteError::Timeout.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            RewriteError::Charset("bad".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_client_server_helpers() {
        assert!(RewriteError::InvalidRequest("bad".to_string()).is_client_error());
        assert!(!RewriteError::InvalidRequest("bad".to_string()).is_server_error());

        assert!(RewriteError::Timeout.is_server_error());
        assert!(!RewriteError::Timeout.is_client_error());
    }

    #[test]
    fn test_regex_error_is_invalid_configuration() {
        let err: RewriteError = regex::Regex::new("(unclosed").unwrap_err().into();
        assert!(matches!(err, RewriteError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_recoverable_rewrite_failures() {
        let codec = RewriteError::Codec {
            coding: "gzip",
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt"),
        };
        assert!(codec.is_recoverable_rewrite_failure());
        assert!(codec.to_string().starts_with("gzip codec failure"));
        assert!(RewriteError::Charset("bad".to_string()).is_recoverable_rewrite_failure());

        let io = RewriteError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(!io.is_recoverable_rewrite_failure());
    }
}
