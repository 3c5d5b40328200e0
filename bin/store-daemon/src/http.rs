//! Operational HTTP endpoints: metrics, health and a state dump

use http_body_util::Full;
use hyper::{
    body::{Bytes, Incoming},
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use proxy_api::{EndpointInfo, Service};
use proxy_store::{Store, Txn, LATEST};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::consumer::StateSummary;

#[derive(Serialize)]
struct StateDump {
    summary: StateSummary,
    services: Vec<ServiceDump>,
}

#[derive(Serialize)]
struct ServiceDump {
    service: Service,
    endpoints: Vec<EndpointInfo>,
}

/// Accept connections on `addr` until the listener fails
pub async fn serve(addr: SocketAddr, store: Arc<Store>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Error accepting HTTP connection: {}", e);
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let store = store.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let store = store.clone();
                async move {
                    Ok::<_, hyper::Error>(route(req.method(), req.uri().path(), &store).await)
                }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving HTTP connection from {}: {}", peer_addr, e);
            }
        });
    }
}

pub async fn route(method: &Method, path: &str, store: &Store) -> Response<Full<Bytes>> {
    debug!("{} {}", method, path);

    if *method != Method::GET {
        return text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed\n");
    }

    match path {
        "/healthz" => {
            if store.view(LATEST, |tx| tx.is_synced()).await {
                text(StatusCode::OK, "OK\n")
            } else {
                text(StatusCode::SERVICE_UNAVAILABLE, "Not synced\n")
            }
        }
        "/metrics" => match store.metrics().map(|metrics| metrics.gather()) {
            Some(Ok(body)) => with_content_type(
                text(StatusCode::OK, body),
                "text/plain; version=0.0.4",
            ),
            Some(Err(e)) => {
                warn!("Failed to gather metrics: {}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics\n")
            }
            None => text(StatusCode::NOT_FOUND, "Metrics disabled\n"),
        },
        "/state" => {
            let dump = store.view(LATEST, |tx| dump_state(tx)).await;
            match serde_json::to_vec(&dump) {
                Ok(body) => with_content_type(text(StatusCode::OK, body), "application/json"),
                Err(e) => {
                    warn!("Failed to encode state: {}", e);
                    text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode state\n")
                }
            }
        }
        _ => text(StatusCode::NOT_FOUND, "Not Found\n"),
    }
}

fn dump_state(tx: &impl Txn) -> StateDump {
    let mut services = Vec::new();
    tx.each_service(|service| {
        let mut endpoints = Vec::new();
        tx.each_endpoint_of_service(&service.namespace, &service.name, |info| {
            endpoints.push(info.clone());
        });
        services.push(ServiceDump {
            service: service.clone(),
            endpoints,
        });
    });

    StateDump {
        summary: StateSummary::collect(tx),
        services,
    }
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

fn with_content_type(
    mut response: Response<Full<Bytes>>,
    content_type: &'static str,
) -> Response<Full<Bytes>> {
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
