//! Axum HTTP server: router, listener, graceful shutdown.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::RelayConfig;
use crate::forward::{ClientResponse, Forwarder, HttpFetcher, RelayQuery};
use crate::stats::RelayStats;

/// Shared application state.
pub struct AppState {
    pub config: RelayConfig,
    pub forwarder: Forwarder<HttpFetcher>,
    pub stats: RelayStats,
}

/// Build the router. Split from [`run`] so tests can serve it on any port.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_relay).options(handle_preflight))
        .route("/api/proxy", get(handle_relay).options(handle_preflight))
        .route("/health", get(handle_health))
        .route("/api/stats", get(handle_get_stats))
        .fallback(handle_fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Build and run the HTTP server.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "cors-relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("cors-relay shut down gracefully");
    Ok(())
}

/// GET `?url=...` — fetch the target and relay it.
///
/// An undecodable query string is treated the same as a missing `url`.
async fn handle_relay(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RelayQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(e) => {
            tracing::debug!(error = %e, "Undecodable query string");
            RelayQuery::default()
        }
    };

    state.forwarder.handle(query).await.into_response()
}

/// OPTIONS — CORS preflight, answered locally.
async fn handle_preflight() -> Response {
    ClientResponse::preflight().into_response()
}

/// GET /api/stats — return current relay counters.
async fn handle_get_stats(State(state): State<Arc<AppState>>) -> Response {
    axum::Json(state.stats.snapshot()).into_response()
}

/// Health check endpoint.
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn handle_fallback() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
