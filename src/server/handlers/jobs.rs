//! Job listing endpoints.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use super::super::AppState;
use super::storage_error;
use crate::models::{ScrapeJob, UrlStatus};

#[derive(Debug, Deserialize)]
pub struct JobListParams {
    pub limit: Option<u32>,
}

/// Most recent jobs, newest first.
pub async fn api_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(20).clamp(1, 500);
    match state.ctx.jobs().list(limit).await {
        Ok(jobs) => axum::Json(jobs).into_response(),
        Err(e) => storage_error(e),
    }
}

#[derive(Debug, Serialize)]
struct JobDetail {
    #[serde(flatten)]
    job: ScrapeJob,
    progress: f64,
    urls: BTreeMap<&'static str, u64>,
}

/// One job with its frontier breakdown.
pub async fn api_job(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let job = match state.ctx.jobs().get(&id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                axum::Json(serde_json::json!({ "error": format!("job {} not found", id) })),
            )
                .into_response()
        }
        Err(e) => return storage_error(e),
    };

    let frontier = state.ctx.frontier();
    let mut urls = BTreeMap::new();
    for status in UrlStatus::ALL {
        match frontier.count_for_job(&id, &[status]).await {
            Ok(n) => {
                urls.insert(status.as_str(), n);
            }
            Err(e) => return storage_error(e),
        }
    }

    axum::Json(JobDetail {
        progress: job.progress(),
        job,
        urls,
    })
    .into_response()
}
