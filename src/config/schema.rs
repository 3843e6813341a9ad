//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the service gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Gateway endpoint settings (operations path, fallback messages).
    pub gateway: EndpointConfig,

    /// Circuit breaker protecting the downstream call.
    pub breaker: BreakerConfig,

    /// Event bus bridge settings and permission rules.
    pub bridge: BridgeConfig,

    /// Downstream service records.
    pub discovery: DiscoveryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Request hardening.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Gateway endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Public read-only path answered by the gateway handler.
    pub operations_path: String,

    /// Name of the downstream service record to resolve.
    pub service_name: String,

    /// Path requested on the downstream service.
    pub downstream_path: String,

    /// Payload message when no downstream service is resolvable.
    pub no_service_message: String,

    /// Payload message when the breaker serves its fallback.
    pub failure_message: String,

    /// Optional directory served for every unmatched path.
    pub static_dir: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            operations_path: "/operations".to_string(),
            service_name: "audit".to_string(),
            downstream_path: "/".to_string(),
            no_service_message: "No audit service".to_string(),
            failure_message: "No audit service, or unable to call it".to_string(),
            static_dir: None,
        }
    }
}

/// Circuit breaker parameters. Read once at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Breaker name used in logs, metrics and status.
    pub name: String,

    /// Consecutive failures that trip the circuit.
    pub max_failures: u32,

    /// Time spent open before a trial call is admitted, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Deadline applied to each protected operation, in milliseconds.
    pub operation_timeout_ms: u64,

    /// Serve the fallback on individual failures while closed.
    pub fallback_on_failure: bool,

    /// Publish state transitions on the event bus.
    pub publish_status: bool,

    /// Bus address for state transition notifications.
    pub notification_address: String,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "http-breaker".to_string(),
            max_failures: 2,
            reset_timeout_ms: 2000,
            operation_timeout_ms: 1000,
            fallback_on_failure: true,
            publish_status: true,
            notification_address: "circuit-breaker".to_string(),
        }
    }
}

/// A single bridge permission entry.
///
/// A bare string matches one address exactly; a table with `address_regex`
/// matches every address the (anchored) expression accepts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AddressRule {
    Exact(String),
    Pattern { address_regex: String },
}

/// Event bus bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Path prefix accepting WebSocket upgrades.
    pub path: String,

    /// Addresses that may flow from the bus to external clients.
    pub outbound: Vec<AddressRule>,

    /// Addresses external clients may publish to.
    pub inbound: Vec<AddressRule>,

    /// Capacity of the internal bus broadcast channel.
    pub bus_capacity: usize,

    /// Maximum accepted frame size in bytes.
    pub max_frame_bytes: usize,

    /// Frames queued per session before a non-reading client is disconnected.
    pub outbox_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            path: "/eventbus".to_string(),
            outbound: Vec::new(),
            inbound: Vec::new(),
            bus_capacity: 1024,
            max_frame_bytes: 64 * 1024,
            outbox_capacity: 256,
        }
    }
}

/// A statically configured downstream service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServiceRecordConfig {
    /// Service name looked up by the gateway.
    pub name: String,

    /// Base HTTP endpoint (e.g., "http://127.0.0.1:8081/").
    pub endpoint: String,
}

/// Service discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Records known at startup.
    pub services: Vec<ServiceRecordConfig>,

    /// Optional TOML file with additional `[[services]]` records.
    pub records_path: Option<String>,

    /// Reload the records file when it changes.
    pub watch: bool,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Downstream connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 1000,
            request_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Placeholder key shipped in the defaults; rejected when admin is enabled.
pub const PLACEHOLDER_ADMIN_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_ADMIN_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Maximum downstream response body size in bytes.
    pub max_response_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            max_response_size: 4 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_rules_accept_strings_and_tables() {
        let config: BridgeConfig = toml::from_str(
            r#"
            outbound = ["market", { address_regex = "portfolio\\..+" }]
            inbound = ["service.portfolio"]
            "#,
        )
        .unwrap();

        assert_eq!(config.outbound[0], AddressRule::Exact("market".into()));
        assert_eq!(
            config.outbound[1],
            AddressRule::Pattern { address_regex: "portfolio\\..+".into() }
        );
        assert_eq!(config.inbound.len(), 1);
        assert_eq!(config.path, "/eventbus");
    }

    #[test]
    fn test_breaker_defaults() {
        let config = BreakerConfig::default();
        assert_eq!(config.max_failures, 2);
        assert_eq!(config.reset_timeout_ms, 2000);
        assert_eq!(config.operation_timeout_ms, 1000);
        assert!(config.fallback_on_failure);
    }
}
