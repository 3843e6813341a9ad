//! Bridge permission filter.
//!
//! # Responsibilities
//! - Compile configured address rules into an immutable table
//! - Answer `permit(direction, address)` for every bridged message
//!
//! # Design Decisions
//! - Default deny: no matching rule means the message is dropped
//! - Exact addresses are looked up by hash, patterns are scanned in order
//! - Patterns are anchored; `market.*` never matches `xmarket.a`
//! - Malformed rules are startup errors, never request-time errors

use std::collections::{HashMap, HashSet};
use std::fmt;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::config::schema::{AddressRule, BridgeConfig};

/// Direction a message travels across the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// External client → internal bus.
    Inbound,
    /// Internal bus → external client.
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// A permission rule that could not be loaded.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("{direction} rule has an empty address")]
    EmptyAddress { direction: Direction },

    #[error("{direction} rule address {address:?} contains whitespace")]
    Whitespace { direction: Direction, address: String },

    #[error("{direction} rule regex {pattern:?} is invalid: {source}")]
    InvalidRegex {
        direction: Direction,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
enum AddressPattern {
    Exact(String),
    Regex(Regex),
}

/// One allow-list entry.
#[derive(Debug, Clone)]
pub struct PermissionRule {
    direction: Direction,
    pattern: AddressPattern,
}

impl PermissionRule {
    /// Rule matching a single address.
    pub fn exact(direction: Direction, address: impl Into<String>) -> Result<Self, RuleError> {
        let address = address.into();
        if address.is_empty() {
            return Err(RuleError::EmptyAddress { direction });
        }
        if address.chars().any(char::is_whitespace) {
            return Err(RuleError::Whitespace { direction, address });
        }
        Ok(Self {
            direction,
            pattern: AddressPattern::Exact(address),
        })
    }

    /// Rule matching every address accepted by the anchored expression.
    pub fn regex(direction: Direction, pattern: &str) -> Result<Self, RuleError> {
        if pattern.is_empty() {
            return Err(RuleError::EmptyAddress { direction });
        }
        let compiled = Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| {
            RuleError::InvalidRegex {
                direction,
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(Self {
            direction,
            pattern: AddressPattern::Regex(compiled),
        })
    }

    fn from_config(direction: Direction, rule: &AddressRule) -> Result<Self, RuleError> {
        match rule {
            AddressRule::Exact(address) => Self::exact(direction, address.clone()),
            AddressRule::Pattern { address_regex } => Self::regex(direction, address_regex),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns true if this rule allows `address` in `direction`.
    pub fn matches(&self, direction: Direction, address: &str) -> bool {
        if self.direction != direction {
            return false;
        }
        match &self.pattern {
            AddressPattern::Exact(expected) => expected == address,
            AddressPattern::Regex(re) => re.is_match(address),
        }
    }
}

/// Immutable set of permission rules keyed by direction.
#[derive(Debug, Default)]
pub struct PermissionTable {
    exact: HashMap<Direction, HashSet<String>>,
    patterns: Vec<PermissionRule>,
}

impl PermissionTable {
    /// Build a table from already-validated rules.
    pub fn new(rules: impl IntoIterator<Item = PermissionRule>) -> Self {
        let mut table = Self::default();
        for rule in rules {
            match rule.pattern {
                AddressPattern::Exact(address) => {
                    table.exact.entry(rule.direction).or_default().insert(address);
                }
                AddressPattern::Regex(_) => table.patterns.push(rule),
            }
        }
        table
    }

    /// Compile the bridge section of the configuration.
    ///
    /// Every malformed rule is reported, not just the first.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, Vec<RuleError>> {
        let mut rules = Vec::new();
        let mut errors = Vec::new();

        let entries = config
            .outbound
            .iter()
            .map(|r| (Direction::Outbound, r))
            .chain(config.inbound.iter().map(|r| (Direction::Inbound, r)));

        for (direction, entry) in entries {
            match PermissionRule::from_config(direction, entry) {
                Ok(rule) => rules.push(rule),
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(Self::new(rules))
        } else {
            Err(errors)
        }
    }

    /// True iff at least one loaded rule matches `(direction, address)`.
    pub fn permit(&self, direction: Direction, address: &str) -> bool {
        if self
            .exact
            .get(&direction)
            .is_some_and(|addresses| addresses.contains(address))
        {
            return true;
        }
        self.patterns.iter().any(|rule| rule.matches(direction, address))
    }

    /// Total number of loaded rules.
    pub fn len(&self) -> usize {
        self.exact.values().map(HashSet::len).sum::<usize>() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(outbound: &[&str], inbound: &[&str]) -> PermissionTable {
        let config = BridgeConfig {
            outbound: outbound.iter().map(|a| AddressRule::Exact(a.to_string())).collect(),
            inbound: inbound.iter().map(|a| AddressRule::Exact(a.to_string())).collect(),
            ..BridgeConfig::default()
        };
        PermissionTable::from_config(&config).unwrap()
    }

    #[test]
    fn test_default_deny() {
        let table = PermissionTable::default();
        assert!(table.is_empty());
        assert!(!table.permit(Direction::Outbound, "market"));
        assert!(!table.permit(Direction::Inbound, "market"));
    }

    #[test]
    fn test_direction_aware() {
        let table = table(&["market"], &["service.portfolio"]);

        assert!(table.permit(Direction::Outbound, "market"));
        assert!(!table.permit(Direction::Inbound, "market"));

        assert!(table.permit(Direction::Inbound, "service.portfolio"));
        assert!(!table.permit(Direction::Outbound, "service.portfolio"));

        assert!(!table.permit(Direction::Outbound, "portfolio"));
        assert!(!table.permit(Direction::Outbound, "market.extra"));
    }

    #[test]
    fn test_regex_rules_are_anchored() {
        let config = BridgeConfig {
            outbound: vec![AddressRule::Pattern { address_regex: "market\\..+".into() }],
            ..BridgeConfig::default()
        };
        let table = PermissionTable::from_config(&config).unwrap();

        assert!(table.permit(Direction::Outbound, "market.quotes"));
        assert!(!table.permit(Direction::Outbound, "market."));
        assert!(!table.permit(Direction::Outbound, "xmarket.quotes"));
        assert!(!table.permit(Direction::Inbound, "market.quotes"));
    }

    #[test]
    fn test_wildcard_only_when_configured() {
        let config = BridgeConfig {
            outbound: vec![AddressRule::Pattern { address_regex: ".*".into() }],
            ..BridgeConfig::default()
        };
        let table = PermissionTable::from_config(&config).unwrap();
        assert!(table.permit(Direction::Outbound, "anything"));
        assert!(!table.permit(Direction::Inbound, "anything"));
    }

    #[test]
    fn test_malformed_rules_are_all_reported() {
        let config = BridgeConfig {
            outbound: vec![
                AddressRule::Exact(String::new()),
                AddressRule::Exact("market".into()),
            ],
            inbound: vec![
                AddressRule::Pattern { address_regex: "(".into() },
                AddressRule::Exact("has space".into()),
            ],
            ..BridgeConfig::default()
        };

        let errors = PermissionTable::from_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], RuleError::EmptyAddress { direction: Direction::Outbound }));
        assert!(matches!(errors[1], RuleError::InvalidRegex { .. }));
        assert!(matches!(errors[2], RuleError::Whitespace { .. }));
    }
}
