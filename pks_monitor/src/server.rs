//! The metrics and probe endpoints

use std::io;
use std::net::SocketAddr;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::metrics::ApiMetrics;

#[derive(Clone, Debug)]
struct AppState {
    metrics: ApiMetrics,
    shutdown: CancellationToken,
}

/// Builds the router serving `/metrics`, `/healthz`, and `/prestop`
pub fn router(metrics: ApiMetrics, shutdown: CancellationToken) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/healthz", get(healthz))
        .route("/prestop", get(prestop))
        .with_state(AppState { metrics, shutdown })
}

/// Serves the router on `addr` until the cancellation token fires
///
/// In-flight requests are drained before the server returns.
pub async fn serve(
    addr: SocketAddr,
    metrics: ApiMetrics,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "http server listening");

    let drain = shutdown.clone();
    axum::serve(listener, router(metrics, shutdown))
        .with_graceful_shutdown(async move {
            drain.cancelled().await;
            tracing::info!("http server shutting down");
        })
        .await
}

async fn render_metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}

// Liveness only: the process being able to answer is the whole check.
async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn prestop(State(state): State<AppState>) -> Json<Value> {
    tracing::info!("prestop requested, draining");
    state.shutdown.cancel();
    Json(json!({ "status": "shutting down" }))
}
