//! Fallback payloads.

use axum::body::Bytes;
use serde_json::json;

use crate::config::schema::EndpointConfig;

/// Produces the default payloads served instead of a live response.
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    no_service: Bytes,
    failure: Bytes,
}

impl FallbackPolicy {
    pub fn new(no_service_message: &str, failure_message: &str) -> Self {
        Self {
            no_service: message_body(no_service_message),
            failure: message_body(failure_message),
        }
    }

    pub fn from_config(config: &EndpointConfig) -> Self {
        Self::new(&config.no_service_message, &config.failure_message)
    }

    /// Payload when no downstream service is resolved.
    pub fn no_service(&self) -> Bytes {
        self.no_service.clone()
    }

    /// Payload when the call was skipped or failed.
    pub fn failure(&self) -> Bytes {
        self.failure.clone()
    }
}

fn message_body(message: &str) -> Bytes {
    Bytes::from(json!({ "message": message }).to_string())
}
