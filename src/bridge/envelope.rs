//! JSON text frames exchanged with bridge clients.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error message sent when a frame is refused by the permission filter.
pub const ACCESS_DENIED: &str = "access_denied";

/// Error message sent when a frame cannot be decoded.
pub const INVALID_FRAME: &str = "invalid_frame";

/// Frame sent by an external client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Point-to-point send. Relayed as a publish: replies are not supported.
    Send {
        address: String,
        #[serde(default)]
        body: Value,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Publish {
        address: String,
        #[serde(default)]
        body: Value,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Register {
        address: String,
    },
    Unregister {
        address: String,
    },
    Ping,
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Frame sent to an external client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// A bus message delivered to a subscribed session.
    Rec {
        address: String,
        body: Value,
        #[serde(skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
    #[serde(rename = "err")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        address: Option<String>,
        message: String,
    },
    Pong,
}

impl ServerFrame {
    pub fn access_denied(address: impl Into<String>) -> Self {
        ServerFrame::Error {
            address: Some(address.into()),
            message: ACCESS_DENIED.to_string(),
        }
    }

    pub fn invalid_frame() -> Self {
        ServerFrame::Error {
            address: None,
            message: INVALID_FRAME.to_string(),
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
