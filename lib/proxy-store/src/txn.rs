//! Transactions handed to `update` and `view` callbacks
//!
//! `ReadTx` only reads. `WriteTx` reads and writes. Both borrow the locked
//! state, so neither can outlive the callback it was passed to.

use proxy_api::{EndpointInfo, Service, ServiceKey};
use std::sync::Arc;
use tracing::trace;

use crate::source_index::Visibility;
use crate::state::State;
use crate::{Result, Revision, StoreError};

/// Feeder kinds that report when their initial listing is complete
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncKind {
    Services,
    Endpoints,
}

impl SyncKind {
    pub const ALL: [SyncKind; 2] = [SyncKind::Services, SyncKind::Endpoints];
}

mod sealed {
    pub trait Sealed {
        fn state(&self) -> &crate::state::State;
    }
}

/// Read operations shared by both transaction kinds
pub trait Txn: sealed::Sealed {
    /// Revision of the state this transaction observes
    fn revision(&self) -> Revision {
        self.state().revision
    }

    /// Visit every service, ordered by namespace then name
    fn each_service<F>(&self, mut f: F)
    where
        F: FnMut(&Service),
    {
        for entry in self.state().services.values() {
            if let Some(service) = &entry.service {
                f(service.as_ref());
            }
        }
    }

    /// Visit the endpoints of a service: visible sources in lexicographic
    /// order, each source's endpoints in the order they were written
    fn each_endpoint_of_service<F>(&self, namespace: &str, service: &str, mut f: F)
    where
        F: FnMut(&EndpointInfo),
    {
        if let Some(entry) = self.state().entry(namespace, service) {
            for info in entry.endpoints.iter(&entry.visibility) {
                f(info.as_ref());
            }
        }
    }

    fn endpoints_of_service(&self, namespace: &str, service: &str) -> Vec<Arc<EndpointInfo>> {
        self.state()
            .entry(namespace, service)
            .map(|entry| entry.endpoints.iter(&entry.visibility).cloned().collect())
            .unwrap_or_default()
    }

    fn get_service(&self, key: &ServiceKey) -> Option<Arc<Service>> {
        self.state()
            .services
            .get(key)
            .and_then(|entry| entry.service.clone())
    }

    /// Sources currently holding endpoints for a service, visible or not
    fn sources_of_service(&self, namespace: &str, service: &str) -> Vec<String> {
        self.state()
            .entry(namespace, service)
            .map(|entry| entry.endpoints.sources().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn service_count(&self) -> usize {
        self.state().service_count
    }

    fn endpoint_count(&self) -> usize {
        self.state().endpoint_count
    }

    /// True once every feeder kind has reported its initial listing
    fn is_synced(&self) -> bool {
        SyncKind::ALL
            .iter()
            .all(|kind| self.state().synced.contains(kind))
    }
}

/// Read-only transaction passed to `view`
pub struct ReadTx<'a> {
    state: &'a State,
}

impl<'a> ReadTx<'a> {
    pub(crate) fn new(state: &'a State) -> Self {
        Self { state }
    }
}

impl sealed::Sealed for ReadTx<'_> {
    fn state(&self) -> &State {
        self.state
    }
}

impl Txn for ReadTx<'_> {}

/// Read-write transaction passed to `update`.
///
/// Writes apply directly to the store's mapping. No reader can observe them
/// before the enclosing `update` commits.
pub struct WriteTx<'a> {
    state: &'a mut State,
}

impl<'a> WriteTx<'a> {
    pub(crate) fn new(state: &'a mut State) -> Self {
        Self { state }
    }

    /// Insert or replace a service and record which sources may contribute
    /// its endpoints (`*` for all of them)
    pub fn set_service<S: AsRef<str>>(
        &mut self,
        service: Service,
        visible_sources: &[S],
    ) -> Result<()> {
        require("namespace", &service.namespace)?;
        require("service name", &service.name)?;
        let visibility = Visibility::from_sources(visible_sources)
            .ok_or_else(|| StoreError::InvalidVisibility(service.key().to_string()))?;

        trace!(service = %service.key(), ?visibility, "set service");
        self.state.put_service(service, visibility);
        Ok(())
    }

    /// Remove a service record. Its endpoints are kept.
    pub fn delete_service(&mut self, key: &ServiceKey) -> Result<()> {
        require("namespace", &key.namespace)?;
        require("service name", &key.name)?;

        trace!(service = %key, "delete service");
        self.state.remove_service(key);
        Ok(())
    }

    /// Replace every endpoint `source` holds for a service. An empty list
    /// removes the source.
    pub fn set_endpoints_of_source(
        &mut self,
        namespace: &str,
        service: &str,
        source: &str,
        endpoints: Vec<EndpointInfo>,
    ) -> Result<()> {
        require("namespace", namespace)?;
        require("service name", service)?;
        require("source", source)?;

        trace!(namespace, service, source, count = endpoints.len(), "set endpoints");
        self.state.put_endpoints(namespace, service, source, endpoints);
        Ok(())
    }

    pub fn delete_endpoints_of_source(
        &mut self,
        namespace: &str,
        service: &str,
        source: &str,
    ) -> Result<()> {
        require("namespace", namespace)?;
        require("service name", service)?;
        require("source", source)?;

        trace!(namespace, service, source, "delete endpoints");
        self.state.remove_endpoints(namespace, service, source);
        Ok(())
    }

    /// Record that a feeder kind finished its initial listing
    pub fn set_synced(&mut self, kind: SyncKind) {
        self.state.synced.insert(kind);
    }
}

impl sealed::Sealed for WriteTx<'_> {
    fn state(&self) -> &State {
        &*self.state
    }
}

impl Txn for WriteTx<'_> {}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        Err(StoreError::InvalidKey { field })
    } else {
        Ok(())
    }
}
