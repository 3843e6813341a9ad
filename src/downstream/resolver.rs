//! Resolved downstream handle.
//!
//! The gateway never looks up the registry per request. It reads the slot
//! filled here, which is refreshed at startup, whenever the registry changes,
//! and whenever the breaker opens.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::discovery::{ServiceRecord, ServiceRegistry};

/// Slot holding the currently resolved record for one service name.
#[derive(Debug)]
pub struct DownstreamResolver {
    registry: Arc<ServiceRegistry>,
    service_name: String,
    slot: ArcSwapOption<ServiceRecord>,
}

impl DownstreamResolver {
    /// Create the resolver and perform the initial resolution.
    pub fn new(registry: Arc<ServiceRegistry>, service_name: impl Into<String>) -> Self {
        let resolver = Self {
            registry,
            service_name: service_name.into(),
            slot: ArcSwapOption::empty(),
        };
        resolver.resolve();
        resolver
    }

    /// Look the service up again. Returns whether a record was found.
    pub fn resolve(&self) -> bool {
        let record = self.registry.lookup(&self.service_name);
        match &record {
            Some(record) => tracing::info!(
                service = %self.service_name,
                endpoint = %record.endpoint,
                "Downstream service resolved"
            ),
            None => tracing::warn!(service = %self.service_name, "No downstream service available"),
        }
        let found = record.is_some();
        self.slot.store(record.map(Arc::new));
        found
    }

    /// The resolved record, if any.
    pub fn current(&self) -> Option<Arc<ServiceRecord>> {
        self.slot.load_full()
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceRecordConfig;

    fn audit(endpoint: &str) -> ServiceRecord {
        ServiceRecord::from_config(&ServiceRecordConfig {
            name: "audit".into(),
            endpoint: endpoint.into(),
        })
        .unwrap()
    }

    #[test]
    fn test_empty_registry_resolves_nothing() {
        let resolver = DownstreamResolver::new(Arc::new(ServiceRegistry::new(Vec::new())), "audit");
        assert!(resolver.current().is_none());
        assert!(!resolver.resolve());
    }

    #[test]
    fn test_slot_follows_registry_only_on_resolve() {
        let registry = Arc::new(ServiceRegistry::new(vec![audit("http://127.0.0.1:9001")]));
        let resolver = DownstreamResolver::new(registry.clone(), "audit");
        assert_eq!(resolver.current().unwrap().endpoint.port(), Some(9001));

        registry.replace(vec![audit("http://127.0.0.1:9002")]);
        assert_eq!(resolver.current().unwrap().endpoint.port(), Some(9001));

        assert!(resolver.resolve());
        assert_eq!(resolver.current().unwrap().endpoint.port(), Some(9002));
    }
}
