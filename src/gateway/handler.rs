//! Operations gateway: resolve, protect, call, fall back.

use std::sync::Arc;

use axum::body::Bytes;

use crate::config::GatewayConfig;
use crate::downstream::{DownstreamClient, DownstreamError, DownstreamResolver};
use crate::gateway::fallback::FallbackPolicy;
use crate::observability::metrics;
use crate::resilience::CircuitBreaker;

/// How a reply was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Downstream body, verbatim.
    Live,
    /// Breaker fallback (open circuit, failed trial, or failure with fallback enabled).
    Fallback,
    /// Failure while closed with fallback disabled.
    Failed,
    /// No downstream service resolved; the breaker was not consulted.
    NoService,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Live => "live",
            Outcome::Fallback => "fallback",
            Outcome::Failed => "failed",
            Outcome::NoService => "no_service",
        }
    }
}

/// JSON payload plus how it was obtained.
#[derive(Debug, Clone)]
pub struct GatewayReply {
    pub outcome: Outcome,
    pub body: Bytes,
}

/// The protected read path behind the operations endpoint.
pub struct OperationsGateway {
    resolver: Arc<DownstreamResolver>,
    breaker: Arc<CircuitBreaker>,
    client: DownstreamClient,
    fallback: FallbackPolicy,
    downstream_path: String,
}

impl OperationsGateway {
    pub fn new(
        resolver: Arc<DownstreamResolver>,
        breaker: Arc<CircuitBreaker>,
        client: DownstreamClient,
        fallback: FallbackPolicy,
        downstream_path: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            breaker,
            client,
            fallback,
            downstream_path: downstream_path.into(),
        }
    }

    pub fn from_config(
        config: &GatewayConfig,
        resolver: Arc<DownstreamResolver>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self::new(
            resolver,
            breaker,
            DownstreamClient::from_config(config),
            FallbackPolicy::from_config(&config.gateway),
            config.gateway.downstream_path.clone(),
        )
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Produce the operations payload. Never fails.
    pub async fn fetch(&self, request_id: Option<&str>) -> GatewayReply {
        let Some(record) = self.resolver.current() else {
            tracing::debug!(service = %self.resolver.service_name(), "No downstream service resolved");
            return GatewayReply {
                outcome: Outcome::NoService,
                body: self.fallback.no_service(),
            };
        };

        let result = self
            .breaker
            .execute_with_fallback(
                || async {
                    let body = self
                        .client
                        .call(&record, &self.downstream_path, request_id)
                        .await
                        .inspect_err(|e| {
                            tracing::warn!(
                                service = %record.name,
                                request_id = request_id.unwrap_or("unknown"),
                                error = %e,
                                "Downstream call failed"
                            );
                            metrics::record_downstream_error(e.kind());
                        })?;
                    Ok::<_, DownstreamError>(GatewayReply {
                        outcome: Outcome::Live,
                        body,
                    })
                },
                |error| {
                    tracing::debug!(reason = error.kind(), "Serving fallback");
                    GatewayReply {
                        outcome: Outcome::Fallback,
                        body: self.fallback.failure(),
                    }
                },
            )
            .await;

        result.unwrap_or_else(|error| {
            tracing::debug!(error = %error, "Downstream failure without fallback");
            GatewayReply {
                outcome: Outcome::Failed,
                body: self.fallback.failure(),
            }
        })
    }
}
