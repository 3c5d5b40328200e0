//! Consumer that follows store revisions and logs a summary of each one

use proxy_store::{Revision, Store, Txn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Counts derived from one consistent view of the store
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSummary {
    pub revision: Revision,
    pub services: usize,
    pub endpoints: usize,
    pub ready_endpoints: usize,
    /// Services with no ready endpoint
    pub unready_services: usize,
    pub synced: bool,
}

impl StateSummary {
    pub fn collect(tx: &impl Txn) -> Self {
        let mut summary = Self {
            revision: tx.revision(),
            synced: tx.is_synced(),
            ..Default::default()
        };

        tx.each_service(|service| {
            summary.services += 1;
            let mut ready = 0;
            tx.each_endpoint_of_service(&service.namespace, &service.name, |info| {
                summary.endpoints += 1;
                if info.conditions.ready {
                    ready += 1;
                }
            });
            summary.ready_endpoints += ready;
            if ready == 0 {
                summary.unready_services += 1;
            }
        });

        summary
    }
}

/// Log a summary every time the store moves past the last revision seen,
/// at most once per `interval`
pub async fn log_changes(store: Arc<Store>, interval: Duration) {
    let mut last_seen: Revision = 0;
    loop {
        let summary = store.view(last_seen + 1, |tx| StateSummary::collect(tx)).await;
        last_seen = summary.revision;

        info!(
            revision = summary.revision,
            services = summary.services,
            endpoints = summary.endpoints,
            ready_endpoints = summary.ready_endpoints,
            unready_services = summary.unready_services,
            synced = summary.synced,
            "Store state"
        );

        tokio::time::sleep(interval).await;
    }
}
