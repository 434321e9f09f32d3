//! HTTP server for the Prometheus metrics endpoint.
//!
//! Runs on its own port so the scrape path never competes with pipeline
//! work.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;

/// Start the metrics server on the given port.
///
/// Returns a `JoinHandle` that can be used to abort the server; it runs
/// until aborted or the process exits.
pub fn start(port: u16) -> JoinHandle<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tokio::spawn(async move {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler));

        tracing::info!(port, "Metrics server starting");

        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(error = %e, port, "Failed to bind metrics server");
                return;
            }
        };

        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Metrics server error");
        }
    })
}

async fn metrics_handler() -> impl IntoResponse {
    let body = relay_events::metrics::gather();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
