//! Service records and the records file format.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::schema::ServiceRecordConfig;

/// Errors raised while loading service records.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("service record has an empty name")]
    EmptyName,

    #[error("service {name:?} has invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        name: String,
        endpoint: String,
        reason: String,
    },

    #[error("duplicate service record {0:?}")]
    Duplicate(String),

    #[error("failed to read records file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse records file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A resolvable downstream HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    /// Base URL, always ending with `/`.
    pub endpoint: Url,
}

impl ServiceRecord {
    /// Validate a configured record.
    pub fn from_config(config: &ServiceRecordConfig) -> Result<Self, DiscoveryError> {
        if config.name.trim().is_empty() {
            return Err(DiscoveryError::EmptyName);
        }

        let invalid = |reason: String| DiscoveryError::InvalidEndpoint {
            name: config.name.clone(),
            endpoint: config.endpoint.clone(),
            reason,
        };

        let mut endpoint = Url::parse(&config.endpoint).map_err(|e| invalid(e.to_string()))?;
        if endpoint.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme {:?}", endpoint.scheme())));
        }
        if endpoint.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            name: config.name.clone(),
            endpoint,
        })
    }

    /// Absolute URL for `path`, relative to the record's base endpoint.
    pub fn url_for(&self, path: &str) -> Result<Url, url::ParseError> {
        self.endpoint.join(path.trim_start_matches('/'))
    }
}

/// Validate a list of configured records, reporting every problem.
pub fn parse_records(configs: &[ServiceRecordConfig]) -> Result<Vec<ServiceRecord>, Vec<DiscoveryError>> {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(configs.len());
    let mut errors = Vec::new();

    for config in configs {
        match ServiceRecord::from_config(config) {
            Ok(record) => {
                if !seen.insert(record.name.clone()) {
                    errors.push(DiscoveryError::Duplicate(record.name));
                } else {
                    records.push(record);
                }
            }
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(records)
    } else {
        Err(errors)
    }
}

#[derive(Debug, Deserialize, Default)]
struct RecordsFile {
    #[serde(default)]
    services: Vec<ServiceRecordConfig>,
}

/// Load and validate a `[[services]]` records file.
pub fn load_records_file(path: &Path) -> Result<Vec<ServiceRecord>, DiscoveryError> {
    let content = fs::read_to_string(path)?;
    parse_records_str(&content)
}

/// Parse records file content. The first invalid record is returned as the error.
pub fn parse_records_str(content: &str) -> Result<Vec<ServiceRecord>, DiscoveryError> {
    let file: RecordsFile = toml::from_str(content)?;
    parse_records(&file.services).map_err(|mut errors| errors.remove(0))
}
