//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Wire breaker hooks (re-resolution, status notifications)
//! - Produce the shared application state
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::bridge::{PermissionTable, RuleError, SessionMultiplexer};
use crate::bus::EventBus;
use crate::config::validation::validate_config;
use crate::config::{BreakerConfig, ConfigError, GatewayConfig};
use crate::discovery::record::{load_records_file, parse_records};
use crate::discovery::{DiscoveryError, ServiceRegistry};
use crate::downstream::DownstreamResolver;
use crate::gateway::OperationsGateway;
use crate::http::server::AppState;
use crate::lifecycle::shutdown::Shutdown;
use crate::resilience::CircuitBreaker;

/// Fatal error before the gateway accepts traffic.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid bridge rules: {}", join(.0))]
    Rules(Vec<RuleError>),

    #[error("invalid service records: {}", join(.0))]
    Records(Vec<DiscoveryError>),

    #[error("records file {path}: {source}")]
    RecordsFile {
        path: String,
        #[source]
        source: DiscoveryError,
    },

    #[error("TLS setup failed: {0}")]
    Tls(#[source] std::io::Error),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

fn join<T: Display>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Build every subsystem and return the shared handler state.
///
/// The configuration is validated again here, so programmatically built
/// configs get the same checks as loaded files.
pub fn bootstrap(config: &GatewayConfig, shutdown: Shutdown) -> Result<AppState, StartupError> {
    validate_config(config).map_err(ConfigError::Validation)?;

    let permissions = PermissionTable::from_config(&config.bridge).map_err(StartupError::Rules)?;
    tracing::info!(rules = permissions.len(), "Bridge permissions loaded");

    let static_records = parse_records(&config.discovery.services).map_err(StartupError::Records)?;
    let registry = Arc::new(ServiceRegistry::new(static_records));
    if let Some(path) = &config.discovery.records_path {
        let records = load_records_file(Path::new(path)).map_err(|source| StartupError::RecordsFile {
            path: path.clone(),
            source,
        })?;
        registry.replace(records);
    }

    let resolver = Arc::new(DownstreamResolver::new(registry.clone(), config.gateway.service_name.clone()));
    let bus = EventBus::new(config.bridge.bus_capacity);
    let breaker = Arc::new(build_breaker(&config.breaker, &bus, &resolver));
    tracing::info!(
        breaker = %breaker.name(),
        max_failures = config.breaker.max_failures,
        reset_timeout_ms = config.breaker.reset_timeout_ms,
        operation_timeout_ms = config.breaker.operation_timeout_ms,
        "Circuit breaker ready"
    );

    let gateway = Arc::new(OperationsGateway::from_config(config, resolver.clone(), breaker));
    let bridge = Arc::new(
        SessionMultiplexer::new(permissions, bus.clone()).with_outbox_capacity(config.bridge.outbox_capacity),
    );

    Ok(AppState {
        gateway,
        bridge,
        bus,
        registry,
        resolver,
        shutdown,
        max_frame_bytes: config.bridge.max_frame_bytes,
        started_at: Instant::now(),
    })
}

/// Create the breaker with its standard hooks.
///
/// Opening re-resolves the downstream; every transition is published on the
/// notification address when enabled.
pub fn build_breaker(config: &BreakerConfig, bus: &EventBus, resolver: &Arc<DownstreamResolver>) -> CircuitBreaker {
    let resolver = Arc::clone(resolver);
    let breaker = CircuitBreaker::from_config(config).on_open(move |_| {
        resolver.resolve();
    });

    if !config.publish_status {
        return breaker;
    }

    let bus = bus.clone();
    let address = config.notification_address.clone();
    breaker.on_transition(move |transition| match serde_json::to_value(&transition.status) {
        Ok(status) => {
            bus.publish(address.clone(), status);
        }
        Err(e) => tracing::warn!(error = %e, "Failed to encode breaker status"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceRecordConfig;
    use serde_json::json;

    #[test]
    fn test_bootstrap_defaults() {
        let state = bootstrap(&GatewayConfig::default(), Shutdown::new()).unwrap();
        assert!(state.resolver.current().is_none());
        assert_eq!(state.bridge.session_count(), 0);
        assert!(state.registry.is_empty());
    }

    #[test]
    fn test_missing_records_file_is_fatal() {
        let mut config = GatewayConfig::default();
        config.discovery.records_path = Some("/definitely/not/records.toml".into());
        let err = bootstrap(&config, Shutdown::new()).err().expect("bootstrap should fail");
        assert!(matches!(err, StartupError::RecordsFile { .. }));
    }

    #[test]
    fn test_operation_timeout_beyond_request_timeout_is_rejected() {
        let mut config = GatewayConfig::default();
        config.timeouts.request_secs = 1;
        config.breaker.operation_timeout_ms = 3000;
        let err = bootstrap(&config, Shutdown::new()).err().expect("bootstrap should fail");
        assert!(matches!(err, StartupError::Config(ConfigError::Validation(_))));
    }

    #[tokio::test]
    async fn test_breaker_publishes_transitions() {
        let bus = EventBus::new(8);
        let registry = Arc::new(ServiceRegistry::new(Vec::new()));
        registry.replace(
            parse_records(&[ServiceRecordConfig {
                name: "audit".into(),
                endpoint: "http://127.0.0.1:1/".into(),
            }])
            .unwrap(),
        );
        let resolver = Arc::new(DownstreamResolver::new(registry.clone(), "audit"));
        let config = BreakerConfig {
            max_failures: 1,
            ..BreakerConfig::default()
        };
        let breaker = build_breaker(&config, &bus, &resolver);
        let mut notifications = bus.consumer("circuit-breaker");

        // The service disappears; opening the circuit must notice.
        registry.replace(Vec::new());
        let _ = breaker.execute(|| async { Err::<(), _>("down") }).await;

        let message = notifications.recv().await.unwrap();
        assert_eq!(message.body, json!({"name": "http-breaker", "state": "OPEN", "failureCount": 1}));
        assert!(resolver.current().is_none());
    }
}
