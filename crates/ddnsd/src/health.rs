// # Health probe server
//
// Kubernetes liveness/readiness endpoints, served on their own task:
//
// - `GET /healthz`: 200 `ok` while the process runs
// - `GET /readyz`: 200 `ready` when the router API and DNS provider respond,
//   503 `not ready` otherwise
// - anything else: 404 `not found`
//
// Handlers only call `ReadinessCheck::is_ready()`; they hold no reference
// to the engine.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use ddns_core::ReadinessCheck;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

type SharedReadiness = Arc<dyn ReadinessCheck>;

fn plain(status: StatusCode, body: &'static str) -> impl IntoResponse {
    (status, [(header::CONTENT_TYPE, "text/plain")], body)
}

async fn healthz() -> impl IntoResponse {
    plain(StatusCode::OK, "ok")
}

async fn readyz(State(readiness): State<SharedReadiness>) -> impl IntoResponse {
    if readiness.is_ready().await {
        plain(StatusCode::OK, "ready")
    } else {
        plain(StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn not_found() -> impl IntoResponse {
    plain(StatusCode::NOT_FOUND, "not found")
}

/// Probe routes over `readiness`
pub fn router(readiness: SharedReadiness) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .fallback(not_found)
        .with_state(readiness)
}

/// Bind the probe listener on all interfaces
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await
}

/// Serve probes on `listener` until `shutdown` turns true
pub async fn serve(
    listener: TcpListener,
    readiness: SharedReadiness,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(port = addr.port(), "Health server started");
    }

    axum::serve(listener, router(readiness))
        .with_graceful_shutdown(async move {
            // a dropped sender also ends the server
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}
