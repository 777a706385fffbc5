//! HTTP request handlers for the JSON API.

mod api;
mod jobs;

pub use api::{api_countries, api_hourly, api_states, api_stats, health};
pub use jobs::{api_job, api_jobs};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// 500 with a JSON error body.
fn storage_error(e: impl std::fmt::Display) -> Response {
    tracing::warn!("API storage error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(serde_json::json!({ "error": e.to_string() })),
    )
        .into_response()
}
