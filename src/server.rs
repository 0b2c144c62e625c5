//! HTTP server for exposing Prometheus metrics.
//!
//! This module provides an Axum-based HTTP server that serves the `/metrics`
//! endpoint for Prometheus scraping and a `/health` endpoint for health checks.
//! Scrapes only render the last published metric set; they never trigger a
//! collection.

use crate::error::{ExporterError, Result};
use crate::scheduler::PublishedMetrics;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared application state.
#[derive(Clone)]
struct AppState {
    published: Arc<PublishedMetrics>,
}

/// Build the exporter router.
pub fn router(published: Arc<PublishedMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { published })
}

/// Serve the router on an already bound listener.
pub async fn serve(listener: TcpListener, published: Arc<PublishedMetrics>) -> Result<()> {
    axum::serve(listener, router(published))
        .await
        .map_err(|e| ExporterError::Server(e.to_string()))
}

/// Start the HTTP server.
///
/// # Arguments
///
/// * `listen_address` - Address to bind to (e.g., "0.0.0.0:8001")
/// * `published` - Metric set published by the scheduler
///
/// # Examples
///
/// ```no_run
/// use restic_exporter::scheduler::PublishedMetrics;
/// use restic_exporter::server::start_server;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() {
///     let published = Arc::new(PublishedMetrics::new());
///     start_server("0.0.0.0:8001", published).await.unwrap();
/// }
/// ```
pub async fn start_server(listen_address: &str, published: Arc<PublishedMetrics>) -> Result<()> {
    info!("Starting HTTP server on {}", listen_address);

    let listener = TcpListener::bind(listen_address).await.map_err(|e| {
        ExporterError::Server(format!("Failed to bind {}: {}", listen_address, e))
    })?;

    serve(listener, published).await
}

/// Handler for /metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    debug!("Received metrics scrape request");

    let Some(set) = state.published.current().await else {
        debug!("No metrics published yet");
        return (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_FORMAT)], String::new())
            .into_response();
    };

    match set.encode() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Handler for /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "OK").into_response()
}

/// Handler for root endpoint.
async fn root_handler() -> Response {
    let html = r#"
<!DOCTYPE html>
<html>
<head>
    <title>restic Exporter</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        h1 { color: #333; }
        a { color: #0066cc; text-decoration: none; }
        a:hover { text-decoration: underline; }
        .info { background: #f0f0f0; padding: 15px; border-radius: 5px; margin: 20px 0; }
    </style>
</head>
<body>
    <h1>restic Exporter</h1>
    <div class="info">
        <p>Prometheus metrics exporter for restic backup repositories</p>
        <p><strong>Endpoints:</strong></p>
        <ul>
            <li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
            <li><a href="/health">/health</a> - Health check</li>
        </ul>
    </div>
</body>
</html>
"#;

    (StatusCode::OK, Html(html)).into_response()
}
