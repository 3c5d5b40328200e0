use anyhow::Result;
use k8s_openapi::api::core::v1::Service as KubeService;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::{Api, Client};
use proxy_store::{Store, StoreMetrics};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod consumer;
mod feeder;
mod http;
mod translate;

use config::{DaemonConfig, LogFormat};
use feeder::{EndpointSliceFeed, ServiceFeed};

#[tokio::main]
async fn main() -> Result<()> {
    let config = DaemonConfig::from_env()?;
    init_tracing(config.log_format);

    info!("Starting store-daemon...");

    // The one store of this process
    let store = Arc::new(Store::with_metrics(StoreMetrics::new()?));
    info!("Proxy store initialized");

    let client = Client::try_default().await?;
    let (services, slices): (Api<KubeService>, Api<EndpointSlice>) = match &config.namespace {
        Some(namespace) => {
            info!("Watching namespace {}", namespace);
            (
                Api::namespaced(client.clone(), namespace),
                Api::namespaced(client, namespace),
            )
        }
        None => {
            info!("Watching all namespaces");
            (Api::all(client.clone()), Api::all(client))
        }
    };

    tokio::spawn(feeder::run::<ServiceFeed>(services, store.clone()));
    tokio::spawn(feeder::run::<EndpointSliceFeed>(slices, store.clone()));
    tokio::spawn(consumer::log_changes(store.clone(), config.log_interval));

    let metrics_addr = config.metrics_addr;
    tokio::spawn(async move {
        if let Err(e) = http::serve(metrics_addr, store).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting...");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
