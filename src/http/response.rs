//! Response construction.
//!
//! # Design Decisions
//! - Gateway replies are always `200 application/json`; the payload says what happened
//! - `x-gateway-outcome` tells operators which path produced the body

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::gateway::Outcome;

/// Header naming how the body was produced.
pub const X_GATEWAY_OUTCOME: &str = "x-gateway-outcome";

/// Build the operations response.
pub fn json_reply(outcome: Outcome, body: Bytes) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (
                header::HeaderName::from_static(X_GATEWAY_OUTCOME),
                HeaderValue::from_static(outcome.as_str()),
            ),
        ],
        Body::from(body),
    )
        .into_response()
}
