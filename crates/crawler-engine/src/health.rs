use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crawler_coordination::KvClient;
use crawler_core::{CrawlerError, HealthReport, ServiceStatus};
use crawler_metrics::Metrics;

use crate::bus::BusProducer;

pub struct HealthState {
    pub kv: Arc<KvClient>,
    pub bus: Arc<BusProducer>,
    pub metrics: Arc<Metrics>,
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let redis = match state.kv.ping().await {
        Ok(()) => ServiceStatus {
            healthy: true,
            error: None,
        },
        Err(e) => ServiceStatus {
            healthy: false,
            error: Some(e.to_string()),
        },
    };
    let kafka = match state.bus.health_check() {
        Ok(()) => ServiceStatus {
            healthy: true,
            error: None,
        },
        Err(e) => ServiceStatus {
            healthy: false,
            error: Some(e.to_string()),
        },
    };

    let report = HealthReport::new(redis, kafka);
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    state.metrics.render_prometheus()
}

/// Serves `/health` and `/metrics` until `shutdown` fires, then drains for
/// up to 5s before returning.
pub async fn serve(
    port: u16,
    state: Arc<HealthState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> Result<(), CrawlerError> {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(state);

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| CrawlerError::Other(e.into()))?;

    info!(port, "monitor server listening");

    let shutdown_signal = async move {
        let _ = shutdown.recv().await;
        info!("monitor server draining");
    };

    tokio::time::timeout(
        Duration::from_secs(5) + Duration::from_millis(500),
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal),
    )
    .await
    .unwrap_or(Ok(()))
    .map_err(|e| CrawlerError::Other(e.into()))
}
