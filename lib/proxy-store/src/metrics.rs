//! Prometheus metrics for store activity

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use crate::Result;

/// Prometheus metrics collector for store commits and reads
#[derive(Clone)]
pub struct StoreMetrics {
    /// Last committed revision
    pub revision: IntGauge,
    /// Committed update transactions
    pub updates_total: IntCounter,
    /// Completed view transactions
    pub views_total: IntCounter,
    /// Time spent inside update callbacks, lock held
    pub update_duration_seconds: Histogram,
    /// Time views spent waiting for their target revision
    pub view_wait_seconds: Histogram,
    /// Services currently stored
    pub services: IntGauge,
    /// Endpoints currently stored, across every source
    pub endpoints: IntGauge,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl StoreMetrics {
    /// Create a collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let revision = IntGauge::new("proxystore_revision", "Last committed store revision")?;
        let updates_total = IntCounter::new(
            "proxystore_updates_total",
            "Total committed update transactions",
        )?;
        let views_total = IntCounter::new(
            "proxystore_views_total",
            "Total completed view transactions",
        )?;
        let update_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "proxystore_update_duration_seconds",
            "Time spent holding the write lock per update",
        ))?;
        let view_wait_seconds = Histogram::with_opts(HistogramOpts::new(
            "proxystore_view_wait_seconds",
            "Time views waited for their requested revision",
        ))?;
        let services = IntGauge::new("proxystore_services", "Services currently stored")?;
        let endpoints = IntGauge::new("proxystore_endpoints", "Endpoints currently stored")?;

        registry.register(Box::new(revision.clone()))?;
        registry.register(Box::new(updates_total.clone()))?;
        registry.register(Box::new(views_total.clone()))?;
        registry.register(Box::new(update_duration_seconds.clone()))?;
        registry.register(Box::new(view_wait_seconds.clone()))?;
        registry.register(Box::new(services.clone()))?;
        registry.register(Box::new(endpoints.clone()))?;

        Ok(Self {
            revision,
            updates_total,
            views_total,
            update_duration_seconds,
            view_wait_seconds,
            services,
            endpoints,
            registry,
        })
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        // TextEncoder only writes UTF-8
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
