//! In-memory service registry.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::discovery::record::ServiceRecord;

/// Registry of downstream service records.
///
/// Readers never block: each lookup loads the current snapshot, and
/// `replace` swaps in a whole new snapshot atomically.
#[derive(Debug)]
pub struct ServiceRegistry {
    /// Records supplied by configuration; always part of every snapshot.
    static_records: Vec<ServiceRecord>,
    records: ArcSwap<HashMap<String, ServiceRecord>>,
}

impl ServiceRegistry {
    /// Create a registry seeded with the statically configured records.
    pub fn new(static_records: Vec<ServiceRecord>) -> Self {
        let snapshot = Self::merge(&static_records, Vec::new());
        Self {
            static_records,
            records: ArcSwap::from_pointee(snapshot),
        }
    }

    /// Look up a record by service name.
    pub fn lookup(&self, name: &str) -> Option<ServiceRecord> {
        self.records.load().get(name).cloned()
    }

    /// Replace the dynamic records. Dynamic records override static ones of the same name.
    pub fn replace(&self, dynamic: Vec<ServiceRecord>) {
        let snapshot = Self::merge(&self.static_records, dynamic);
        tracing::info!(records = snapshot.len(), "Service registry updated");
        self.records.store(Arc::new(snapshot));
    }

    /// Names of all known services, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.load().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.records.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn merge(static_records: &[ServiceRecord], dynamic: Vec<ServiceRecord>) -> HashMap<String, ServiceRecord> {
        let mut merged: HashMap<String, ServiceRecord> = static_records
            .iter()
            .map(|r| (r.name.clone(), r.clone()))
            .collect();
        for record in dynamic {
            merged.insert(record.name.clone(), record);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceRecordConfig;

    fn record(name: &str, endpoint: &str) -> ServiceRecord {
        ServiceRecord::from_config(&ServiceRecordConfig {
            name: name.into(),
            endpoint: endpoint.into(),
        })
        .unwrap()
    }

    #[test]
    fn test_lookup_and_replace() {
        let registry = ServiceRegistry::new(vec![record("quotes", "http://localhost:1")]);
        assert!(registry.lookup("audit").is_none());
        assert!(registry.lookup("quotes").is_some());

        registry.replace(vec![record("audit", "http://localhost:2")]);
        assert_eq!(registry.names(), vec!["audit".to_string(), "quotes".to_string()]);

        // Static records survive a replace that drops every dynamic record.
        registry.replace(Vec::new());
        assert!(registry.lookup("audit").is_none());
        assert!(registry.lookup("quotes").is_some());
    }

    #[test]
    fn test_dynamic_overrides_static() {
        let registry = ServiceRegistry::new(vec![record("audit", "http://localhost:1")]);
        registry.replace(vec![record("audit", "http://localhost:2")]);
        let resolved = registry.lookup("audit").unwrap();
        assert_eq!(resolved.endpoint.port(), Some(2));
    }
}
