//! JSON API for the crawl dashboard.
//!
//! Read-only: stats rollups, job progress and a liveness probe. Crawling
//! itself is driven from the CLI.

mod cache;
mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::repository::DbContext;

use cache::StatsCache;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub ctx: DbContext,
    pub stats_cache: Arc<StatsCache>,
    pub started_at: Instant,
    /// Reported by the health endpoint so replicas can be told apart.
    pub host: String,
}

impl AppState {
    pub fn new(ctx: DbContext) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            ctx,
            stats_cache: Arc::new(StatsCache::new()),
            started_at: Instant::now(),
            host,
        }
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    ctx.init_schema().await?;
    let app = create_router(AppState::new(ctx));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::models::{ContactRecord, JobSeed, JobType, UrlSource};
    use crate::repository::test_support::setup_test_db;

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn contact(email: &str, country: &str, state: &str) -> ContactRecord {
        ContactRecord {
            country: country.to_string(),
            state: state.to_string(),
            source_url: "https://example-farm.com".to_string(),
            ..ContactRecord::new(email)
        }
    }

    #[tokio::test]
    async fn test_health() {
        let (ctx, _dir) = setup_test_db().await;
        let app = create_router(AppState::new(ctx));

        let (status, json) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].is_u64());
    }

    #[tokio::test]
    async fn test_stats_empty() {
        let (ctx, _dir) = setup_test_db().await;
        let app = create_router(AppState::new(ctx));

        let (status, json) = get_json(app, "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_contacts"], 0);
        assert_eq!(json["total_urls"], 0);
    }

    #[tokio::test]
    async fn test_countries_group_states() {
        let (ctx, _dir) = setup_test_db().await;
        let contacts = ctx.contacts();
        contacts.upsert(&contact("a@ranch.com", "US", "Texas")).await.unwrap();
        contacts.upsert(&contact("b@ranch.com", "US", "Texas")).await.unwrap();
        contacts.upsert(&contact("c@ranch.com", "US", "")).await.unwrap();
        contacts.upsert(&contact("d@farm.nz", "NZ", "Canterbury")).await.unwrap();
        let app = create_router(AppState::new(ctx));

        let (status, json) = get_json(app.clone(), "/api/countries").await;
        assert_eq!(status, StatusCode::OK);
        let countries = json.as_array().unwrap();
        assert_eq!(countries.len(), 2);
        assert_eq!(countries[0]["code"], "US");
        assert_eq!(countries[0]["name"], "United States");
        assert_eq!(countries[0]["total"], 3);
        assert_eq!(countries[0]["states"][0]["state"], "Texas");
        assert_eq!(countries[0]["states"][0]["count"], 2);
        assert_eq!(countries[0]["states"][1]["state"], "Unknown");

        let (_, json) = get_json(app, "/api/states").await;
        let states = json.as_array().unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0]["label"], "Texas");
    }

    #[tokio::test]
    async fn test_job_detail() {
        let (ctx, _dir) = setup_test_db().await;
        let seeds = vec![JobSeed::Page {
            url: "https://directory.example.com/cattle".to_string(),
            source: UrlSource::Directory,
            label: "directory".to_string(),
            region: None,
        }];
        let job = ctx
            .jobs()
            .create(JobType::Directories, "US", &[], &seeds)
            .await
            .unwrap();
        let app = create_router(AppState::new(ctx));

        let (status, json) = get_json(app.clone(), &format!("/api/jobs/{}", job.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], job.id);
        assert_eq!(json["status"], "queued");
        assert_eq!(json["urls"]["pending"], 0);

        let (_, json) = get_json(app.clone(), "/api/jobs").await;
        assert_eq!(json.as_array().unwrap().len(), 1);

        let (status, json) = get_json(app, "/api/jobs/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("nope"));
    }
}
