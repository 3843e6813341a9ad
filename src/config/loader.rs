//! Configuration loading from disk.

use std::path::Path;
use std::fs;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::AddressRule;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:8080"

            [breaker]
            max_failures = 3
            reset_timeout_ms = 5000
            operation_timeout_ms = 250
            fallback_on_failure = false

            [bridge]
            outbound = ["market", "portfolio", { address_regex = "service\\.portfolio\\..*" }]
            inbound = ["service.portfolio"]

            [[discovery.services]]
            name = "audit"
            endpoint = "http://127.0.0.1:8082/"
            "#,
        )
        .unwrap();

        assert_eq!(config.breaker.max_failures, 3);
        assert!(!config.breaker.fallback_on_failure);
        assert_eq!(config.breaker.name, "http-breaker");
        assert_eq!(config.bridge.outbound.len(), 3);
        assert_eq!(config.bridge.inbound, vec![AddressRule::Exact("service.portfolio".into())]);
        assert_eq!(config.discovery.services[0].name, "audit");
        assert_eq!(config.gateway.operations_path, "/operations");
    }

    #[test]
    fn test_malformed_rule_fails_fast() {
        let err = parse_config(
            r#"
            [bridge]
            outbound = [""]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("empty address"));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(parse_config("[breaker"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
