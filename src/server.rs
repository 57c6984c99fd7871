//! Metrics exporter HTTP server
//!
//! `GET /metrics` runs a full collection (running-job gauges plus cluster
//! stats, when enabled) and renders the Prometheus text format.
//! `GET /health` answers `ok`.

use crate::instrumentation::Instrumentation;
use crate::observability::{PrometheusSink, SinkError};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tracing::{debug, error, info};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Scrapes served at the same time; the rest wait
const MAX_CONCURRENT_SCRAPES: usize = 4;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("failed to render metrics: {0}")]
    Render(#[from] SinkError),
}

impl IntoResponse for ExporterError {
    fn into_response(self) -> axum::response::Response {
        error!(error = %self, "Metrics scrape failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

#[derive(Clone)]
pub struct ExporterState {
    pub instrumentation: Instrumentation,
    pub sink: Arc<PrometheusSink>,
}

impl ExporterState {
    pub fn new(instrumentation: Instrumentation, sink: Arc<PrometheusSink>) -> Self {
        Self {
            instrumentation,
            sink,
        }
    }

    /// Collect once and render the exposition text
    pub async fn scrape(&self) -> Result<String, ExporterError> {
        let report = self.instrumentation.collector.collect().await;
        debug!(
            running_keys = report.running_keys,
            retired_keys = report.retired_keys,
            cluster = ?report.cluster,
            "Collection finished"
        );
        Ok(self.sink.render()?)
    }
}

pub fn router(state: ExporterState) -> Router {
    Router::new()
        .route(
            "/metrics",
            get(metrics).layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_SCRAPES)),
        )
        .route("/health", get(health))
        .with_state(state)
}

pub async fn run(address: SocketAddr, state: ExporterState) -> Result<(), AnyError> {
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "jobmeter exporter listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn metrics(State(state): State<ExporterState>) -> Result<impl IntoResponse, ExporterError> {
    let body = state.scrape().await?;
    Ok((
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        body,
    ))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
