//! End-to-end crawl pipeline tests.
//!
//! Drives the frontier, worker pool, job manager and orchestrator against a
//! temporary SQLite database with scripted fetch, extract and search
//! collaborators.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use diesel_async::SimpleAsyncConnection;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

use herdscout::discovery::{DiscoveryError, QuerySource};
use herdscout::extract::{Extraction, ExtractionError, Extractor};
use herdscout::models::{ContactRecord, JobStatus, JobType, NewUrl, UrlSource, UrlStatus};
use herdscout::repository::{DbContext, DbPool, ReclaimPolicy};
use herdscout::scrapers::{FetchError, FetchedPage, Fetcher};
use herdscout::services::{
    reclaim_all, JobManager, JobSettings, Orchestrator, OrchestratorConfig, WorkerConfig,
    WorkerPool, WorkerSummary,
};

async fn setup_db() -> (DbContext, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let ctx = DbContext::new(&dir.path().join("pipeline.db"));
    ctx.init_schema().await.unwrap();
    (ctx, dir)
}

/// Serves a small farm page for every URL.
struct StaticFetcher;

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        Ok(FetchedPage {
            url: url.to_string(),
            html: "<html><body>Contact a@ranch.com</body></html>".to_string(),
            status_code: 200,
        })
    }
}

/// Every request times out.
#[derive(Default)]
struct TimeoutFetcher {
    calls: AtomicU32,
}

#[async_trait]
impl Fetcher for TimeoutFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::transient("request timed out"))
    }
}

/// Yields a@ranch.com from every page.
struct RanchExtractor;

impl Extractor for RanchExtractor {
    fn extract(&self, _html: &str, source_url: &str) -> Result<Extraction, ExtractionError> {
        Ok(Extraction {
            contacts: vec![ContactRecord {
                farm_name: "Rocking R Ranch".to_string(),
                source_url: source_url.to_string(),
                ..ContactRecord::new("a@ranch.com")
            }],
            ..Default::default()
        })
    }
}

/// Returns the same farm site for every query.
struct FarmSearch;

#[async_trait]
impl QuerySource for FarmSearch {
    fn name(&self) -> &str {
        "farm-search"
    }

    async fn search(&self, _query: &str) -> Result<Vec<String>, DiscoveryError> {
        Ok(vec!["https://example-farm.com".to_string()])
    }
}

fn worker_config(workers: usize) -> WorkerConfig {
    WorkerConfig {
        workers,
        batch_size: 5,
        fetch_timeout: Duration::from_secs(5),
        max_attempts: 3,
        retry_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        idle_poll: Duration::from_millis(10),
        until_idle: true,
    }
}

async fn drain_frontier(pool: &WorkerPool) -> WorkerSummary {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let events = tokio::spawn(async move { while event_rx.recv().await.is_some() {} });
    let summary = pool.run(shutdown_rx, event_tx).await.unwrap();
    events.await.unwrap();
    summary
}

#[tokio::test]
async fn test_single_url_happy_path() {
    let (ctx, _dir) = setup_db().await;
    ctx.frontier()
        .enqueue(&NewUrl::new("https://example-farm.com", UrlSource::Search, "test"))
        .await
        .unwrap();

    let pool = WorkerPool::new(
        ctx.clone(),
        Arc::new(StaticFetcher),
        Arc::new(RanchExtractor),
        worker_config(1),
    );
    let summary = drain_frontier(&pool).await;
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.emails, 1);

    assert_eq!(ctx.contacts().count().await.unwrap(), 1);
    let contact = ctx.contacts().get_by_email("a@ranch.com").await.unwrap().unwrap();
    assert_eq!(contact.record.farm_name, "Rocking R Ranch");
    assert_eq!(contact.record.country, "US");

    let row = ctx
        .frontier()
        .get_by_url("https://example-farm.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, UrlStatus::Completed);
    assert_eq!(row.emails_found, 1);
    assert!(row.claimed_by.is_none());
}

#[tokio::test]
async fn test_double_enqueue_keeps_one_row() {
    let (ctx, _dir) = setup_db().await;
    let frontier = ctx.frontier();
    let url = NewUrl::new("https://example-farm.com", UrlSource::Search, "test");

    frontier.enqueue(&url).await.unwrap();
    frontier
        .enqueue(&NewUrl::new("https://example-farm.com/", UrlSource::Directory, "other"))
        .await
        .unwrap();
    frontier.enqueue(&url).await.unwrap();

    assert_eq!(frontier.count_all().await.unwrap(), 1);
    let row = frontier.get_by_url("https://example-farm.com").await.unwrap().unwrap();
    assert_eq!(row.status, UrlStatus::Pending);
    assert_eq!(row.source, UrlSource::Search);
}

#[tokio::test]
async fn test_transient_timeouts_end_failed() {
    let (ctx, _dir) = setup_db().await;
    ctx.frontier()
        .enqueue(&NewUrl::new("https://slow-farm.com", UrlSource::Search, "test"))
        .await
        .unwrap();

    let fetcher = Arc::new(TimeoutFetcher::default());
    let pool = WorkerPool::new(
        ctx.clone(),
        fetcher.clone(),
        Arc::new(RanchExtractor),
        worker_config(1),
    );
    let summary = drain_frontier(&pool).await;
    assert_eq!(summary.failed, 1);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);

    let row = ctx
        .frontier()
        .get_by_url("https://slow-farm.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, UrlStatus::Failed);
    assert_eq!(row.attempts, 3);
    assert!(row.error.unwrap().contains("timed out"));
    assert_eq!(ctx.contacts().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_upserts_merge_into_one_row() {
    let (ctx, _dir) = setup_db().await;

    let mut handles = Vec::new();
    for phone in ["(555) 010-1000", "(555) 020-2000"] {
        let contacts = ctx.contacts();
        handles.push(tokio::spawn(async move {
            let record = ContactRecord {
                phone: phone.to_string(),
                source_url: "https://example-farm.com".to_string(),
                ..ContactRecord::new("Owner@Ranch.com")
            };
            contacts.upsert(&record).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(ctx.contacts().count().await.unwrap(), 1);
    let contact = ctx.contacts().get_by_email("owner@ranch.com").await.unwrap().unwrap();
    assert!(
        contact.record.phone == "(555) 010-1000" || contact.record.phone == "(555) 020-2000",
        "unexpected phone {:?}",
        contact.record.phone
    );
}

#[tokio::test]
async fn test_concurrent_claims_never_overlap() {
    let (ctx, _dir) = setup_db().await;
    let urls: Vec<NewUrl> = (0..120)
        .map(|i| NewUrl::new(format!("https://farm-{}.example.com", i), UrlSource::Search, "test"))
        .collect();
    assert_eq!(ctx.frontier().enqueue_many(&urls).await.unwrap(), 120);

    let mut handles = Vec::new();
    for worker in 0..8 {
        let frontier = ctx.frontier();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            loop {
                let batch = frontier
                    .claim_next(7, &format!("stress-{}", worker))
                    .await
                    .unwrap();
                if batch.is_empty() {
                    return claimed;
                }
                claimed.extend(batch.into_iter().map(|u| u.id));
            }
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.await.unwrap() {
            total += 1;
            assert!(seen.insert(id), "URL {} claimed twice", id);
        }
    }
    assert_eq!(total, 120);
    assert_eq!(
        ctx.frontier()
            .count_with_status(UrlStatus::Processing)
            .await
            .unwrap(),
        120
    );
}

#[tokio::test]
async fn test_orchestrator_runs_job_to_completion() {
    let (ctx, _dir) = setup_db().await;
    let settings = JobSettings {
        max_queries_per_job: 3,
        max_consecutive_query_failures: 10,
        drain_poll: Duration::from_millis(10),
    };
    let jobs = Arc::new(JobManager::new(ctx.clone(), Arc::new(FarmSearch), settings));
    let job = jobs.create(JobType::Search, "NZ", &[]).await.unwrap();
    assert_eq!(job.total_queries, 3);

    let mut config = worker_config(2);
    config.until_idle = false;
    let pool = Arc::new(WorkerPool::new(
        ctx.clone(),
        Arc::new(StaticFetcher),
        Arc::new(RanchExtractor),
        config,
    ));
    let orchestrator = Orchestrator::new(
        ctx.clone(),
        jobs,
        pool,
        OrchestratorConfig {
            once: true,
            poll: Duration::from_millis(10),
            ..Default::default()
        },
    );

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let events = tokio::spawn(async move { while event_rx.recv().await.is_some() {} });
    let summary = tokio::time::timeout(
        Duration::from_secs(30),
        orchestrator.run(shutdown_rx, event_tx),
    )
    .await
    .unwrap()
    .unwrap();
    events.await.unwrap();

    assert_eq!(summary.jobs_completed, 1);
    assert_eq!(summary.workers.completed, 1);

    let job = ctx.jobs().get(&job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.query_index, 3);
    assert_eq!(job.urls_discovered, 1);
    assert_eq!(job.urls_processed, 1);
    assert_eq!(job.emails_found, 1);

    let contact = ctx.contacts().get_by_email("a@ranch.com").await.unwrap().unwrap();
    assert_eq!(contact.record.country, "NZ");
    assert_eq!(ctx.search_queries().count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_cancelled_queued_job_never_runs() {
    let (ctx, _dir) = setup_db().await;
    let jobs = JobManager::new(ctx.clone(), Arc::new(FarmSearch), JobSettings::default());
    let job = jobs.create(JobType::Full, "AU", &[]).await.unwrap();

    jobs.cancel(&job.id).await.unwrap();
    let job = ctx.jobs().get(&job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("cancelled"));
    assert!(ctx.jobs().active().await.unwrap().is_empty());
    assert_eq!(ctx.frontier().count_all().await.unwrap(), 0);
}

#[tokio::test]
async fn test_url_that_keeps_stalling_is_abandoned() {
    let (ctx, _dir) = setup_db().await;
    ctx.frontier()
        .enqueue(&NewUrl::new("https://broken-farm.com", UrlSource::Search, "test"))
        .await
        .unwrap();

    // Every contact write fails, so a worker never gets the URL past storage
    let DbPool::Sqlite(sqlite) = ctx.pool() else {
        unreachable!("tests run on SQLite");
    };
    let mut conn = sqlite.get().await.unwrap();
    conn.batch_execute(
        "CREATE TRIGGER refuse_contacts BEFORE INSERT ON contacts \
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    )
    .await
    .unwrap();
    drop(conn);

    let pool = WorkerPool::new(
        ctx.clone(),
        Arc::new(StaticFetcher),
        Arc::new(RanchExtractor),
        worker_config(1),
    );
    let policy = ReclaimPolicy {
        older_than: Duration::ZERO,
        max_rows: 10,
        max_reclaims: 2,
    };

    for _ in 0..2 {
        let summary = drain_frontier(&pool).await;
        assert_eq!(summary.completed + summary.failed, 0);
        let outcome = reclaim_all(&ctx, &policy).await.unwrap();
        assert_eq!(outcome.released, 1);
        assert_eq!(outcome.abandoned, 0);
    }

    drain_frontier(&pool).await;
    let outcome = reclaim_all(&ctx, &policy).await.unwrap();
    assert_eq!(outcome.released, 0);
    assert_eq!(outcome.abandoned, 1);

    let row = ctx
        .frontier()
        .get_by_url("https://broken-farm.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, UrlStatus::Failed);
    assert_eq!(row.reclaims, 2);
    assert_eq!(row.error.as_deref(), Some("abandoned after 2 stale claims"));
    assert_eq!(ctx.frontier().count_with_status(UrlStatus::Pending).await.unwrap(), 0);
    assert_eq!(ctx.frontier().count_with_status(UrlStatus::Processing).await.unwrap(), 0);
}
