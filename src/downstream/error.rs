//! Downstream call errors.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Terminal failure of a single downstream call.
#[derive(Debug, Error)]
pub enum DownstreamError {
    /// No connection could be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connected, but the response could not be read.
    #[error("response failed: {0}")]
    Response(String),

    /// Well-formed response with a non-2xx status.
    #[error("downstream answered {status}")]
    Server { status: StatusCode },

    /// Nothing terminal within the deadline.
    #[error("downstream call timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be built from the service record.
    #[error("invalid downstream request: {0}")]
    InvalidRequest(String),
}

impl DownstreamError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DownstreamError::Connection(_) => "connection",
            DownstreamError::Response(_) => "response",
            DownstreamError::Server { .. } => "server",
            DownstreamError::Timeout(_) => "timeout",
            DownstreamError::InvalidRequest(_) => "invalid_request",
        }
    }
}
