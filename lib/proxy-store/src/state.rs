//! The mapping guarded by the store lock

use proxy_api::{EndpointInfo, Service, ServiceKey};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::source_index::{SourceIndex, Visibility};
use crate::{Revision, SyncKind};

#[derive(Debug, Default)]
pub struct State {
    pub(crate) revision: Revision,
    pub(crate) services: BTreeMap<ServiceKey, ServiceEntry>,
    pub(crate) synced: BTreeSet<SyncKind>,
    pub(crate) service_count: usize,
    pub(crate) endpoint_count: usize,
}

/// A service record and its endpoints.
///
/// Either half can exist without the other: endpoints may arrive before their
/// service, and deleting a service leaves its endpoints in place.
#[derive(Debug, Default)]
pub(crate) struct ServiceEntry {
    pub(crate) service: Option<Arc<Service>>,
    pub(crate) visibility: Visibility,
    pub(crate) endpoints: SourceIndex,
}

impl ServiceEntry {
    fn is_vacant(&self) -> bool {
        self.service.is_none() && self.endpoints.is_empty()
    }
}

impl State {
    pub(crate) fn entry(&self, namespace: &str, name: &str) -> Option<&ServiceEntry> {
        self.services.get(&ServiceKey::new(namespace, name))
    }

    pub(crate) fn put_service(&mut self, service: Service, visibility: Visibility) {
        let entry = self.services.entry(service.key()).or_default();
        if entry.service.is_none() {
            self.service_count += 1;
        }
        entry.service = Some(Arc::new(service));
        entry.visibility = visibility;
    }

    pub(crate) fn remove_service(&mut self, key: &ServiceKey) -> bool {
        let Some(entry) = self.services.get_mut(key) else {
            return false;
        };
        let removed = entry.service.take().is_some();
        if removed {
            self.service_count -= 1;
        }
        entry.visibility = Visibility::All;
        if entry.is_vacant() {
            self.services.remove(key);
        }
        removed
    }

    pub(crate) fn put_endpoints(
        &mut self,
        namespace: &str,
        service: &str,
        source: &str,
        endpoints: Vec<EndpointInfo>,
    ) {
        let key = ServiceKey::new(namespace, service);
        let added = endpoints.len();
        let endpoints = endpoints.into_iter().map(Arc::new).collect();

        let entry = self.services.entry(key.clone()).or_default();
        let replaced = entry.endpoints.set(source, endpoints);
        let vacant = entry.is_vacant();

        self.endpoint_count = self.endpoint_count + added - replaced;
        if vacant {
            self.services.remove(&key);
        }
    }

    pub(crate) fn remove_endpoints(&mut self, namespace: &str, service: &str, source: &str) {
        let key = ServiceKey::new(namespace, service);
        let Some(entry) = self.services.get_mut(&key) else {
            return;
        };
        self.endpoint_count -= entry.endpoints.remove(source);
        if entry.is_vacant() {
            self.services.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(source: &str) -> EndpointInfo {
        EndpointInfo {
            namespace: "default".to_string(),
            source_name: source.to_string(),
            service_name: "svc".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_counts_follow_writes() {
        let mut state = State::default();
        state.put_service(Service::new("default", "svc"), Visibility::All);
        state.put_service(Service::new("default", "svc"), Visibility::All);
        state.put_endpoints("default", "svc", "a", vec![info("a"), info("a")]);
        state.put_endpoints("default", "svc", "b", vec![info("b")]);
        assert_eq!(state.service_count, 1);
        assert_eq!(state.endpoint_count, 3);

        state.put_endpoints("default", "svc", "a", vec![info("a")]);
        assert_eq!(state.endpoint_count, 2);

        assert!(state.remove_service(&ServiceKey::new("default", "svc")));
        assert_eq!(state.service_count, 0);
        assert_eq!(state.endpoint_count, 2);
    }

    #[test]
    fn test_vacant_entries_are_pruned() {
        let mut state = State::default();
        state.put_endpoints("default", "svc", "a", vec![info("a")]);
        assert!(state.entry("default", "svc").is_some());

        state.put_endpoints("default", "svc", "a", vec![]);
        assert!(state.entry("default", "svc").is_none());
        assert_eq!(state.endpoint_count, 0);

        assert!(!state.remove_service(&ServiceKey::new("default", "svc")));
    }

    #[test]
    fn test_remove_endpoints_of_one_source() {
        let mut state = State::default();
        state.put_endpoints("default", "svc", "a", vec![info("a"), info("a")]);
        state.put_endpoints("default", "svc", "b", vec![info("b")]);

        state.remove_endpoints("default", "svc", "a");
        assert_eq!(state.endpoint_count, 1);
        let entry = state.entry("default", "svc").unwrap();
        assert_eq!(entry.endpoints.sources().collect::<Vec<_>>(), vec!["b"]);

        state.remove_endpoints("default", "svc", "b");
        state.remove_endpoints("default", "missing", "b");
        assert_eq!(state.endpoint_count, 0);
        assert!(state.services.is_empty());
    }

    #[test]
    fn test_delete_service_keeps_endpoints_and_clears_visibility() {
        let mut state = State::default();
        let only_a = Visibility::from_sources(&["a"]).unwrap();
        state.put_service(Service::new("default", "svc"), only_a);
        state.put_endpoints("default", "svc", "b", vec![info("b")]);

        state.remove_service(&ServiceKey::new("default", "svc"));

        let entry = state.entry("default", "svc").unwrap();
        assert!(entry.service.is_none());
        assert_eq!(entry.visibility, Visibility::All);
        assert_eq!(entry.endpoints.iter(&entry.visibility).count(), 1);
    }
}
