//! Router configuration for the JSON API.

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Dashboard rollups
        .route("/api/stats", get(handlers::api_stats))
        .route("/api/states", get(handlers::api_states))
        .route("/api/countries", get(handlers::api_countries))
        .route("/api/hourly", get(handlers::api_hourly))
        // Jobs
        .route("/api/jobs", get(handlers::api_jobs))
        .route("/api/jobs/:id", get(handlers::api_job))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
