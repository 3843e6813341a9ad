//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile bridge permission rules and service records once to surface errors
//! - Validate value ranges (thresholds >= 1, timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

/// Path of the public breaker status endpoint.
pub const BREAKERS_PATH: &str = "/breakers";

use crate::bridge::permissions::{PermissionTable, RuleError};
use crate::config::schema::{GatewayConfig, PLACEHOLDER_ADMIN_KEY};
use crate::discovery::record::{parse_records, DiscoveryError};

/// A single semantic problem in the configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must start with '/' (got {value:?})")]
    InvalidPath { field: &'static str, value: String },

    #[error("bridge path {0:?} collides with the operations path")]
    PathCollision(String),

    #[error("{field} uses the reserved path {value:?}")]
    ReservedPath { field: &'static str, value: String },

    #[error("breaker.operation_timeout_ms ({operation_ms}) must be below timeouts.request_secs ({request_ms} ms)")]
    OperationOutlivesRequest { operation_ms: u64, request_ms: u64 },

    #[error("breaker name must not be empty")]
    EmptyBreakerName,

    #[error("bridge rule: {0}")]
    Rule(#[from] RuleError),

    #[error("discovery: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("admin.api_key must be changed from the placeholder when admin is enabled")]
    PlaceholderAdminKey,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);

    check_path(&mut errors, "gateway.operations_path", &config.gateway.operations_path);
    check_path(&mut errors, "bridge.path", &config.bridge.path);
    if config.bridge.path == config.gateway.operations_path {
        errors.push(ValidationError::PathCollision(config.bridge.path.clone()));
    }
    for (field, value) in [
        ("gateway.operations_path", &config.gateway.operations_path),
        ("bridge.path", &config.bridge.path),
    ] {
        if value.trim_end_matches('/') == BREAKERS_PATH {
            errors.push(ValidationError::ReservedPath {
                field,
                value: value.clone(),
            });
        }
    }

    if config.breaker.name.trim().is_empty() {
        errors.push(ValidationError::EmptyBreakerName);
    }
    check_nonzero(&mut errors, "breaker.max_failures", config.breaker.max_failures as u64);
    check_nonzero(&mut errors, "breaker.reset_timeout_ms", config.breaker.reset_timeout_ms);
    check_nonzero(&mut errors, "breaker.operation_timeout_ms", config.breaker.operation_timeout_ms);

    check_nonzero(&mut errors, "bridge.bus_capacity", config.bridge.bus_capacity as u64);
    check_nonzero(&mut errors, "bridge.max_frame_bytes", config.bridge.max_frame_bytes as u64);
    check_nonzero(&mut errors, "bridge.outbox_capacity", config.bridge.outbox_capacity as u64);
    check_nonzero(&mut errors, "timeouts.connect_ms", config.timeouts.connect_ms);
    check_nonzero(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);

    // The breaker deadline must fire before the HTTP request timeout, or the
    // caller sees a bare timeout status instead of the fallback payload.
    let request_ms = config.timeouts.request_secs.saturating_mul(1000);
    if request_ms > 0 && config.breaker.operation_timeout_ms >= request_ms {
        errors.push(ValidationError::OperationOutlivesRequest {
            operation_ms: config.breaker.operation_timeout_ms,
            request_ms,
        });
    }

    if let Err(rule_errors) = PermissionTable::from_config(&config.bridge) {
        errors.extend(rule_errors.into_iter().map(ValidationError::Rule));
    }

    if let Err(record_errors) = parse_records(&config.discovery.services) {
        errors.extend(record_errors.into_iter().map(ValidationError::Discovery));
    }

    if config.observability.metrics_enabled {
        check_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key == PLACEHOLDER_ADMIN_KEY || config.admin.api_key.is_empty() {
            errors.push(ValidationError::PlaceholderAdminKey);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_path(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if !value.starts_with('/') {
        errors.push(ValidationError::InvalidPath {
            field,
            value: value.to_string(),
        });
    }
}

fn check_nonzero(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::Zero { field });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{AddressRule, ServiceRecordConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.breaker.max_failures = 0;
        config.bridge.inbound.push(AddressRule::Pattern { address_regex: "[".into() });
        config.discovery.services.push(ServiceRecordConfig {
            name: "audit".into(),
            endpoint: "ftp://example.com".into(),
        });
        config.admin.enabled = true;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5, "{:?}", errors);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidAddress { field: "listener.bind_address", .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::Zero { field: "breaker.max_failures" })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::Rule(_))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::Discovery(_))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::PlaceholderAdminKey)));
    }

    #[test]
    fn test_path_collision() {
        let mut config = GatewayConfig::default();
        config.bridge.path = "/operations".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::PathCollision(_)));
    }

    #[test]
    fn test_operation_timeout_must_fit_request_timeout() {
        let mut config = GatewayConfig::default();
        config.timeouts.request_secs = 1;
        config.breaker.operation_timeout_ms = 1000;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            ValidationError::OperationOutlivesRequest { operation_ms: 1000, request_ms: 1000 }
        ));

        config.breaker.operation_timeout_ms = 999;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_reserved_path() {
        let mut config = GatewayConfig::default();
        config.gateway.operations_path = "/breakers".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::ReservedPath { field: "gateway.operations_path", .. }));
    }
}
