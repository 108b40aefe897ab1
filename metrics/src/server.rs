use crate::SharedMetrics;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Where the sync node exposes its Prometheus endpoint.
#[derive(Clone, Debug)]
pub struct MetricsServerConfig {
    pub metrics_address: IpAddr,
    pub metrics_port: u16,
}

impl MetricsServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.metrics_address, self.metrics_port)
    }
}

/// `GET /metrics` over the sync node registry.
pub fn router(metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/metrics", get(export_sync_metrics))
        .with_state(metrics)
}

async fn export_sync_metrics(State(metrics): State<SharedMetrics>) -> Response {
    match metrics.gather() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            warn!(error = %err, "Sync metrics could not be exported");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serve the sync metrics on an already bound listener until it fails.
pub async fn serve(listener: TcpListener, metrics: SharedMetrics) -> Result<()> {
    axum::serve(listener, router(metrics))
        .await
        .context("metrics endpoint stopped")
}

pub async fn run_metrics_server(config: MetricsServerConfig, metrics: SharedMetrics) -> Result<()> {
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind metrics endpoint to {addr}"))?;
    info!(%addr, "Serving sync metrics");

    serve(listener, metrics).await
}
