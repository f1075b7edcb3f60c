use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rewrite::{HandlerId, HandlerParams, HandlerRegistration};

/// Request body for registering a handler
#[derive(Debug, Clone, Deserialize)]
pub struct CreateHandlerRequest {
    #[serde(rename = "type")]
    pub handler_type: String,
    #[serde(default)]
    pub params: HashMap<String, Vec<String>>,
}

impl CreateHandlerRequest {
    pub fn handler_params(&self) -> HandlerParams {
        HandlerParams::from(self.params.clone())
    }
}

/// A registered handler as reported by the admin API
#[derive(Debug, Clone, Serialize)]
pub struct HandlerInfo {
    pub id: HandlerId,
    #[serde(rename = "type")]
    pub handler_type: String,
    pub registered_at: DateTime<Utc>,
}

impl From<&HandlerRegistration> for HandlerInfo {
    fn from(registration: &HandlerRegistration) -> Self {
        Self {
            id: registration.id,
            handler_type: registration.handler.name().to_string(),
            registered_at: registration.registered_at,
        }
    }
}

/// Proxy status summary
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub handler_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_handler_request_defaults_params() {
        let req: CreateHandlerRequest =
            serde_json::from_str(r#"{"type":"ScriptAddingHttpResponseHandler"}"#).unwrap();
        assert_eq!(req.handler_type, "ScriptAddingHttpResponseHandler");
        assert!(req.handler_params().is_empty());
    }

    #[test]
    fn test_create_handler_request_multivalued_params() {
        let req: CreateHandlerRequest = serde_json::from_str(
            r#"{"type":"ContentModifyingHttpResponseHandler","params":{"content_type":["text/html","text/plain"]}}"#,
        )
        .unwrap();
        assert_eq!(
            req.handler_params().get_all("content_type"),
            ["text/html", "text/plain"]
        );
    }
}
