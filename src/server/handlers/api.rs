//! Liveness and stats endpoints.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use super::super::AppState;
use super::storage_error;
use crate::discovery::country_name;

/// Longest hourly window served.
const MAX_HOURLY_WINDOW: u32 = 24 * 14;

/// Liveness probe for container orchestration.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "host": state.host,
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// Headline numbers.
pub async fn api_stats(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(stats) = state.stats_cache.get_dashboard() {
        return axum::Json(stats).into_response();
    }
    match state.ctx.metrics().dashboard().await {
        Ok(stats) => {
            state.stats_cache.set_dashboard(stats.clone());
            axum::Json(stats).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// Contacts per state, largest first.
pub async fn api_states(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(counts) = state.stats_cache.get_states() {
        return axum::Json(counts).into_response();
    }
    match state.ctx.metrics().emails_per_state().await {
        Ok(counts) => {
            state.stats_cache.set_states(counts.clone());
            axum::Json(counts).into_response()
        }
        Err(e) => storage_error(e),
    }
}

#[derive(Debug, Serialize)]
struct StateCount {
    state: String,
    count: u64,
}

#[derive(Debug, Serialize)]
struct CountryBreakdown {
    code: String,
    name: String,
    total: u64,
    states: Vec<StateCount>,
}

/// Contacts per country with a per-state breakdown.
pub async fn api_countries(State(state): State<AppState>) -> impl IntoResponse {
    let rows = match state.stats_cache.get_countries() {
        Some(rows) => rows,
        None => match state.ctx.metrics().emails_by_country_and_state().await {
            Ok(rows) => {
                state.stats_cache.set_countries(rows.clone());
                rows
            }
            Err(e) => return storage_error(e),
        },
    };

    let mut countries: BTreeMap<String, CountryBreakdown> = BTreeMap::new();
    for row in rows {
        let entry = countries
            .entry(row.country.clone())
            .or_insert_with(|| CountryBreakdown {
                name: country_name(&row.country).unwrap_or("Unknown").to_string(),
                code: row.country.clone(),
                total: 0,
                states: Vec::new(),
            });
        entry.total += row.count;
        let label = if row.state.is_empty() {
            "Unknown".to_string()
        } else {
            row.state
        };
        entry.states.push(StateCount {
            state: label,
            count: row.count,
        });
    }

    let mut countries: Vec<CountryBreakdown> = countries.into_values().collect();
    countries.sort_by(|a, b| b.total.cmp(&a.total).then(a.code.cmp(&b.code)));
    axum::Json(countries).into_response()
}

#[derive(Debug, Deserialize)]
pub struct HourlyParams {
    pub hours: Option<u32>,
}

/// New contacts per hour over a trailing window (default 24 hours).
pub async fn api_hourly(
    State(state): State<AppState>,
    Query(params): Query<HourlyParams>,
) -> impl IntoResponse {
    let hours = params.hours.unwrap_or(24).clamp(1, MAX_HOURLY_WINDOW);
    if let Some(counts) = state.stats_cache.get_hourly(hours) {
        return axum::Json(counts).into_response();
    }
    let window = Duration::from_secs(u64::from(hours) * 3600);
    match state.ctx.metrics().hourly(window).await {
        Ok(counts) => {
            state.stats_cache.set_hourly(hours, counts.clone());
            axum::Json(counts).into_response()
        }
        Err(e) => storage_error(e),
    }
}
