//! codeprism-server: HTTP API for ingestion and retrieval.
//!
//! `POST /api/sync` receives change batches from the watcher (or a remote
//! one); the `GET` routes serve search results, flows, cards and health.

mod routes;
mod types;

use axum::{
    routing::{get, post},
    Router,
};
use codeprism_sync::Codeprism;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub use routes::{ApiError, AppState};
pub use types::{SearchResponse, SearchResultItem};

/// Build the API router over a shared service.
pub fn router(cp: Arc<Codeprism>) -> Router {
    Router::new()
        .route("/api/sync", post(routes::api_sync))
        .route("/api/search", get(routes::api_search))
        .route("/api/health", get(routes::api_health))
        .route("/api/flows", get(routes::api_flows))
        .route("/api/cards", get(routes::api_cards))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(cp)
}

/// Serve the API on `bind` until the process is interrupted.
pub async fn serve(cp: Arc<Codeprism>, bind: &str) -> anyhow::Result<()> {
    let app = router(cp);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("codeprism API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("failed to listen for shutdown signal: {e}");
            }
        })
        .await?;
    info!("codeprism API stopped");
    Ok(())
}
