//! HTTP surface
//!
//! [`create_router`] assembles the feature routes under `/api/v1`, the
//! health endpoint and the middleware stack. It is generic over the store
//! so tests can drive the same router against [`crate::db::MemoryStore`].

pub mod response;

use axum::{
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::compression::CompressionLayer;

use crate::config::Config;
use crate::db::Store;
use crate::error::AppError;
use crate::features::{self, AppState};
use crate::middleware;

pub use response::ApiResponse;

/// Build the application router with all routes and middleware.
pub fn create_router<S: Store>(state: AppState<S>, config: &Config) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health::<S>))
        .nest("/api/v1", features::router())
        .with_state(state)
        // Applied innermost-first; the resulting stack is, from outermost:
        // CORS, tracing, compression, body limit.
        .layer(DefaultBodyLimit::max(config.server.max_body_bytes))
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Ledgersync Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Health check handler
async fn health<S: Store>(State(state): State<AppState<S>>) -> Result<impl IntoResponse, AppError> {
    state
        .pipeline
        .store()
        .ping()
        .await
        .map_err(|e| AppError::Unavailable(format!("database unreachable: {}", e)))?;

    Ok(Json(json!({
        "status": "healthy",
        "database": "connected"
    })))
}
