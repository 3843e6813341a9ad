//! HTTP client wrapper for a single downstream call.
//!
//! # Responsibilities
//! - Issue one GET against a resolved service record
//! - Classify failures as connection, response, server or timeout
//! - Bound the response body size
//!
//! # Design Decisions
//! - One pooled hyper client shared by every call
//! - Connect timeout on the connector, whole-call deadline around the future
//! - Exactly one terminal result per call: the timed-out future is dropped

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, Method, Request, Response, Uri};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::GatewayConfig;
use crate::discovery::ServiceRecord;
use crate::downstream::error::DownstreamError;
use crate::http::request::X_REQUEST_ID;
use crate::resilience::with_deadline;

/// Async client for downstream services.
#[derive(Clone)]
pub struct DownstreamClient {
    client: Client<HttpConnector, Body>,
    call_timeout: Duration,
    max_response_size: usize,
}

impl DownstreamClient {
    pub fn new(connect_timeout: Duration, call_timeout: Duration, max_response_size: usize) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            call_timeout,
            max_response_size,
        }
    }

    /// The call deadline never exceeds the breaker's operation timeout.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let call_timeout = Duration::from_secs(config.timeouts.request_secs)
            .min(Duration::from_millis(config.breaker.operation_timeout_ms));
        Self::new(
            Duration::from_millis(config.timeouts.connect_ms),
            call_timeout,
            config.security.max_response_size,
        )
    }

    /// GET `path` on `record` and return the full response body.
    pub async fn call(
        &self,
        record: &ServiceRecord,
        path: &str,
        request_id: Option<&str>,
    ) -> Result<Bytes, DownstreamError> {
        let url = record
            .url_for(path)
            .map_err(|e| DownstreamError::InvalidRequest(e.to_string()))?;
        let uri: Uri = url
            .as_str()
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| DownstreamError::InvalidRequest(e.to_string()))?;

        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::ACCEPT, "application/json");
        if let Some(id) = request_id {
            builder = builder.header(X_REQUEST_ID, id);
        }
        let request = builder
            .body(Body::empty())
            .map_err(|e| DownstreamError::InvalidRequest(e.to_string()))?;

        tracing::debug!(service = %record.name, url = %url, "Calling downstream");
        with_deadline(self.call_timeout, self.send(request), DownstreamError::Timeout).await
    }

    async fn send(&self, request: Request<Body>) -> Result<Bytes, DownstreamError> {
        let response: Response<Incoming> = self.client.request(request).await.map_err(|e| {
            if e.is_connect() {
                DownstreamError::Connection(e.to_string())
            } else {
                DownstreamError::Response(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownstreamError::Server { status });
        }

        axum::body::to_bytes(Body::new(response.into_body()), self.max_response_size)
            .await
            .map_err(|e| DownstreamError::Response(e.to_string()))
    }
}
