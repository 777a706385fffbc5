//! Scrape job lifecycle: plan, issue seeds, drain, close.
//!
//! A job's progress lives entirely in its row. The seed cursor is advanced
//! after every seed, so a job interrupted by shutdown or a crash resumes
//! where it stopped the next time it is run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::discovery::{build_plan, profile, resolve_regions, QuerySource};
use crate::extract::is_junk_source;
use crate::models::{
    EnqueueOutcome, JobSeed, JobStatus, JobType, NewUrl, ScrapeJob, UrlSource, UrlStatus,
};
use crate::repository::{DbContext, DieselError, FrontierError};

/// Error recorded on a job cancelled by an operator.
pub const CANCELLED: &str = "cancelled";

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("unknown country: {0}")]
    UnknownCountry(String),

    #[error("job failed: {0}")]
    Fatal(String),

    #[error("storage error: {0}")]
    Storage(#[from] DieselError),
}

/// Tunables for job execution.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub max_queries_per_job: usize,
    /// Consecutive search errors after which the search source counts as
    /// exhausted and the job fails.
    pub max_consecutive_query_failures: u32,
    pub drain_poll: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            max_queries_per_job: 2000,
            max_consecutive_query_failures: 10,
            drain_poll: Duration::from_secs(2),
        }
    }
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was queued and is now failed.
    Cancelled,
    /// The job is running; its driver will stop and fail it.
    Requested,
}

/// How a call to [`JobManager::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    /// Shutdown was signalled. The job stays `running` for a later resume.
    Interrupted,
}

pub struct JobManager {
    ctx: DbContext,
    query_source: Arc<dyn QuerySource>,
    settings: JobSettings,
}

impl JobManager {
    pub fn new(ctx: DbContext, query_source: Arc<dyn QuerySource>, settings: JobSettings) -> Self {
        Self {
            ctx,
            query_source,
            settings,
        }
    }

    /// Build the seed plan and store a new `queued` job.
    ///
    /// An empty `states` list targets the country's top regions.
    pub async fn create(
        &self,
        job_type: JobType,
        country: &str,
        states: &[String],
    ) -> Result<ScrapeJob, JobError> {
        let profile =
            profile(country).ok_or_else(|| JobError::UnknownCountry(country.to_string()))?;
        let regions = resolve_regions(profile, states);
        let seeds = build_plan(job_type, profile, &regions, self.settings.max_queries_per_job);

        let job = self
            .ctx
            .jobs()
            .create(job_type, profile.code, &regions, &seeds)
            .await?;
        info!(
            "Created {} job {} for {} ({} regions, {} seeds)",
            job_type,
            job.id,
            profile.name,
            regions.len(),
            seeds.len()
        );
        Ok(job)
    }

    pub async fn cancel(&self, id: &str) -> Result<CancelOutcome, JobError> {
        let jobs = self.ctx.jobs();
        let job = jobs
            .get(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        match job.status {
            JobStatus::Queued => {
                if jobs.fail(id, CANCELLED).await? {
                    info!("Cancelled queued job {}", id);
                    return Ok(CancelOutcome::Cancelled);
                }
                // Started between the read and the update
                if jobs.request_cancel(id).await? {
                    return Ok(CancelOutcome::Requested);
                }
            }
            JobStatus::Running => {
                if jobs.request_cancel(id).await? {
                    info!("Cancellation requested for job {}", id);
                    return Ok(CancelOutcome::Requested);
                }
            }
            JobStatus::Completed | JobStatus::Failed => {}
        }

        let current = jobs.get(id).await?.map(|j| j.status).unwrap_or(job.status);
        Err(JobError::InvalidTransition {
            id: id.to_string(),
            from: current,
            to: JobStatus::Failed,
        })
    }

    /// Drive a job to completion.
    ///
    /// A `queued` job is started; a `running` one is resumed from its cursor.
    /// Fatal and storage errors fail the job before they are returned.
    pub async fn run(
        &self,
        id: &str,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<RunOutcome, JobError> {
        let jobs = self.ctx.jobs();
        let job = jobs
            .get(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        let job = match job.status {
            JobStatus::Queued => {
                if !jobs.start(id).await? {
                    return Err(JobError::InvalidTransition {
                        id: id.to_string(),
                        from: job.status,
                        to: JobStatus::Running,
                    });
                }
                info!("Started job {} ({} seeds)", id, job.total_queries);
                job
            }
            JobStatus::Running => {
                info!(
                    "Resuming job {} at seed {}/{}",
                    id, job.query_index, job.total_queries
                );
                job
            }
            status => {
                return Err(JobError::InvalidTransition {
                    id: id.to_string(),
                    from: status,
                    to: JobStatus::Running,
                })
            }
        };

        match self.drive(&job, shutdown).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!("Job {} failed: {}", id, e);
                if let Err(store_err) = jobs.fail(id, &e.to_string()).await {
                    warn!("Could not record failure of job {}: {}", id, store_err);
                }
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        job: &ScrapeJob,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<RunOutcome, JobError> {
        let jobs = self.ctx.jobs();
        let mut consecutive_failures = 0u32;
        let start = job.query_index as usize;

        for (offset, seed) in job.remaining_seeds().iter().enumerate() {
            if *shutdown.borrow() {
                info!("Shutdown: job {} paused at seed {}", job.id, start + offset);
                return Ok(RunOutcome::Interrupted);
            }
            if jobs.is_cancel_requested(&job.id).await? {
                return self.finish_cancelled(job, shutdown).await;
            }

            match seed {
                JobSeed::Search { query, region } => {
                    self.issue_search(job, query, region.as_deref(), &mut consecutive_failures)
                        .await?
                }
                JobSeed::Page {
                    url,
                    source,
                    label,
                    region,
                } => self.issue_page(job, url, *source, label, region.as_deref()).await?,
            }

            jobs.advance_cursor(&job.id, (start + offset + 1) as u32).await?;
        }

        info!("Job {} issued all seeds, draining", job.id);
        let pending = [UrlStatus::Pending, UrlStatus::Processing];
        loop {
            if jobs.is_cancel_requested(&job.id).await? {
                return self.finish_cancelled(job, shutdown).await;
            }
            let remaining = self.ctx.frontier().count_for_job(&job.id, &pending).await?;
            if remaining == 0 {
                break;
            }
            debug!("Job {} waiting on {} URLs", job.id, remaining);
            if self.wait(shutdown).await {
                return Ok(RunOutcome::Interrupted);
            }
        }

        if jobs.complete(&job.id).await? {
            info!("Job {} completed", job.id);
        }
        Ok(RunOutcome::Completed)
    }

    async fn issue_search(
        &self,
        job: &ScrapeJob,
        query: &str,
        region: Option<&str>,
        consecutive_failures: &mut u32,
    ) -> Result<(), JobError> {
        let queries = self.ctx.search_queries();
        if queries.is_done(query).await? {
            debug!("Query already executed: {}", query);
            return Ok(());
        }

        let results = match self.query_source.search(query).await {
            Ok(results) => results,
            Err(e) => {
                *consecutive_failures += 1;
                warn!(
                    "{} search failed for '{}' ({} in a row): {}",
                    self.query_source.name(),
                    query,
                    consecutive_failures,
                    e
                );
                if *consecutive_failures >= self.settings.max_consecutive_query_failures {
                    return Err(JobError::Fatal(format!(
                        "{} exhausted after {} consecutive failures: {}",
                        self.query_source.name(),
                        consecutive_failures,
                        e
                    )));
                }
                return Ok(());
            }
        };
        *consecutive_failures = 0;

        let new_urls: Vec<NewUrl> = results
            .iter()
            .filter(|url| !is_junk_source(url))
            .map(|url| {
                NewUrl::new(url.clone(), UrlSource::Search, query)
                    .with_country(job.country.clone())
                    .with_state(region.map(str::to_string))
                    .with_job(Some(job.id.clone()))
            })
            .collect();
        let inserted = self.ctx.frontier().enqueue_many(&new_urls).await?;

        queries
            .record(query, results.len() as u32, inserted as u32, Some(&job.id))
            .await?;
        self.ctx.jobs().add_discovered(&job.id, inserted as u32).await?;

        debug!(
            "'{}': {} results, {} new URLs",
            query,
            results.len(),
            inserted
        );
        Ok(())
    }

    async fn issue_page(
        &self,
        job: &ScrapeJob,
        url: &str,
        source: UrlSource,
        label: &str,
        region: Option<&str>,
    ) -> Result<(), JobError> {
        let new_url = NewUrl::new(url, source, label)
            .with_country(job.country.clone())
            .with_state(region.map(str::to_string))
            .with_job(Some(job.id.clone()));

        match self.ctx.frontier().enqueue(&new_url).await {
            Ok(EnqueueOutcome::Inserted) => {
                self.ctx.jobs().add_discovered(&job.id, 1).await?;
            }
            Ok(EnqueueOutcome::AlreadyPresent) => {
                debug!("Listing page already known: {}", url);
            }
            Err(FrontierError::InvalidUrl(url)) => {
                warn!("Skipping malformed seed URL: {}", url);
            }
            Err(FrontierError::Storage(e)) => return Err(e.into()),
        }
        Ok(())
    }

    /// Wait for this job's in-flight claims, then fail it as cancelled.
    /// Its pending rows stay in the frontier for anyone to crawl.
    async fn finish_cancelled(
        &self,
        job: &ScrapeJob,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<RunOutcome, JobError> {
        info!("Job {} cancelled, draining in-flight URLs", job.id);
        loop {
            let in_flight = self
                .ctx
                .frontier()
                .count_for_job(&job.id, &[UrlStatus::Processing])
                .await?;
            if in_flight == 0 {
                break;
            }
            if self.wait(shutdown).await {
                return Ok(RunOutcome::Interrupted);
            }
        }
        self.ctx.jobs().fail(&job.id, CANCELLED).await?;
        Ok(RunOutcome::Cancelled)
    }

    /// Sleep one drain poll. Returns true if shutdown was signalled.
    async fn wait(&self, shutdown: &watch::Receiver<bool>) -> bool {
        let mut shutdown = shutdown.clone();
        if *shutdown.borrow() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.settings.drain_poll) => *shutdown.borrow(),
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<ScrapeJob>, JobError> {
        Ok(self.ctx.jobs().get(id).await?)
    }

    pub async fn list(&self, limit: u32) -> Result<Vec<ScrapeJob>, JobError> {
        Ok(self.ctx.jobs().list(limit).await?)
    }

    pub async fn next_queued(&self) -> Result<Option<ScrapeJob>, JobError> {
        Ok(self.ctx.jobs().next_queued().await?)
    }

    pub async fn active(&self) -> Result<Vec<ScrapeJob>, JobError> {
        Ok(self.ctx.jobs().active().await?)
    }

    pub async fn count_by_status(&self) -> Result<HashMap<JobStatus, u64>, JobError> {
        Ok(self.ctx.jobs().count_by_status().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryError;
    use crate::repository::test_support::setup_test_db;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns two fresh farm URLs per query and remembers what was asked.
    #[derive(Default)]
    struct RecordingSource {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QuerySource for RecordingSource {
        fn name(&self) -> &str {
            "recording"
        }

        async fn search(&self, query: &str) -> Result<Vec<String>, DiscoveryError> {
            let mut queries = self.queries.lock().unwrap();
            queries.push(query.to_string());
            let n = queries.len();
            Ok(vec![
                format!("https://farm{}a.com", n),
                format!("https://farm{}b.com", n),
                "https://www.facebook.com/somefarm".to_string(),
            ])
        }
    }

    struct DownSource;

    #[async_trait]
    impl QuerySource for DownSource {
        fn name(&self) -> &str {
            "down"
        }

        async fn search(&self, _query: &str) -> Result<Vec<String>, DiscoveryError> {
            Err(DiscoveryError::Unavailable("HTTP 503".to_string()))
        }
    }

    fn settings(max_queries: usize) -> JobSettings {
        JobSettings {
            max_queries_per_job: max_queries,
            max_consecutive_query_failures: 2,
            drain_poll: Duration::from_millis(10),
        }
    }

    fn texas() -> Vec<String> {
        vec!["TX".to_string()]
    }

    /// Complete every pending URL as a worker would.
    async fn crawl_all(ctx: &DbContext) {
        loop {
            let batch = ctx.frontier().claim_next(50, "test").await.unwrap();
            if batch.is_empty() {
                break;
            }
            for url in batch {
                ctx.frontier().complete(url.id, 0).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_create_builds_plan() {
        let (ctx, _dir) = setup_test_db().await;
        let manager = JobManager::new(ctx, Arc::new(RecordingSource::default()), settings(5));

        let job = manager.create(JobType::Search, "US", &texas()).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.states, vec!["Texas".to_string()]);
        assert_eq!(job.total_queries, 5);
        assert_eq!(job.query_index, 0);

        let err = manager.create(JobType::Search, "ZZ", &[]).await.unwrap_err();
        assert!(matches!(err, JobError::UnknownCountry(_)));
    }

    #[tokio::test]
    async fn test_run_issues_seeds_and_completes() {
        let (ctx, _dir) = setup_test_db().await;
        let source = Arc::new(RecordingSource::default());
        let manager = Arc::new(JobManager::new(ctx.clone(), source.clone(), settings(3)));
        let job = manager.create(JobType::Search, "US", &texas()).await.unwrap();

        let (_tx, shutdown) = watch::channel(false);
        let task_manager = manager.clone();
        let id = job.id.clone();
        let handle = tokio::spawn(async move { task_manager.run(&id, &shutdown).await });

        // Let the driver enqueue, then act as the worker pool
        tokio::time::sleep(Duration::from_millis(100)).await;
        let running = ctx.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(running.status, JobStatus::Running);
        crawl_all(&ctx).await;

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, RunOutcome::Completed);

        let done = ctx.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.query_index, 3);
        // Facebook results are dropped as junk
        assert_eq!(done.urls_discovered, 6);
        assert_eq!(source.queries.lock().unwrap().len(), 3);
        assert_eq!(ctx.search_queries().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_resume_skips_issued_seeds() {
        let (ctx, _dir) = setup_test_db().await;
        let source = Arc::new(RecordingSource::default());
        let manager = JobManager::new(ctx.clone(), source.clone(), settings(4));
        let job = manager.create(JobType::Search, "US", &texas()).await.unwrap();

        // Simulate a crash after two seeds
        assert!(ctx.jobs().start(&job.id).await.unwrap());
        assert!(ctx.jobs().advance_cursor(&job.id, 2).await.unwrap());

        let (_tx, shutdown) = watch::channel(false);
        let outcome = manager.run(&job.id, &shutdown);
        let crawler = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            crawl_all(&ctx).await;
        };
        let (outcome, _) = tokio::join!(outcome, crawler);
        assert_eq!(outcome.unwrap(), RunOutcome::Completed);

        let issued = source.queries.lock().unwrap().clone();
        let expected: Vec<&str> = job.seeds[2..].iter().map(|s| s.describe()).collect();
        assert_eq!(issued, expected);
    }

    #[tokio::test]
    async fn test_job_waits_for_drain() {
        let (ctx, _dir) = setup_test_db().await;
        let manager = Arc::new(JobManager::new(
            ctx.clone(),
            Arc::new(RecordingSource::default()),
            settings(1),
        ));
        let job = manager.create(JobType::Search, "US", &texas()).await.unwrap();

        let (_tx, shutdown) = watch::channel(false);
        let task_manager = manager.clone();
        let id = job.id.clone();
        let handle = tokio::spawn(async move { task_manager.run(&id, &shutdown).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());
        let job_row = ctx.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(job_row.status, JobStatus::Running);
        assert_eq!(job_row.query_index, 1);

        crawl_all(&ctx).await;
        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_exhausted_search_fails_job() {
        let (ctx, _dir) = setup_test_db().await;
        let manager = JobManager::new(ctx.clone(), Arc::new(DownSource), settings(5));
        let job = manager.create(JobType::Search, "US", &texas()).await.unwrap();

        let (_tx, shutdown) = watch::channel(false);
        let err = manager.run(&job.id, &shutdown).await.unwrap_err();
        assert!(matches!(err, JobError::Fatal(_)));

        let failed = ctx.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.unwrap().contains("exhausted"));
        // The first failed query advanced the cursor, the second ended the job
        assert_eq!(failed.query_index, 1);
        assert_eq!(ctx.search_queries().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_queued_job() {
        let (ctx, _dir) = setup_test_db().await;
        let manager = JobManager::new(ctx.clone(), Arc::new(RecordingSource::default()), settings(2));
        let job = manager.create(JobType::Search, "US", &texas()).await.unwrap();

        assert_eq!(manager.cancel(&job.id).await.unwrap(), CancelOutcome::Cancelled);
        let cancelled = ctx.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(cancelled.status, JobStatus::Failed);
        assert_eq!(cancelled.error.as_deref(), Some(CANCELLED));

        let err = manager.cancel(&job.id).await.unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));
        assert!(matches!(
            manager.cancel("no-such-job").await.unwrap_err(),
            JobError::NotFound(_)
        ));

        let (_tx, shutdown) = watch::channel(false);
        assert!(matches!(
            manager.run(&job.id, &shutdown).await.unwrap_err(),
            JobError::InvalidTransition { .. }
        ));
    }

    #[tokio::test]
    async fn test_cancel_running_job_leaves_pending_urls() {
        let (ctx, _dir) = setup_test_db().await;
        let manager = Arc::new(JobManager::new(
            ctx.clone(),
            Arc::new(RecordingSource::default()),
            settings(1),
        ));
        let job = manager.create(JobType::Search, "US", &texas()).await.unwrap();

        let (_tx, shutdown) = watch::channel(false);
        let task_manager = manager.clone();
        let id = job.id.clone();
        let handle = tokio::spawn(async move { task_manager.run(&id, &shutdown).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.cancel(&job.id).await.unwrap(), CancelOutcome::Requested);

        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);

        let cancelled = ctx.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(cancelled.status, JobStatus::Failed);
        let pending = ctx
            .frontier()
            .count_for_job(&job.id, &[UrlStatus::Pending])
            .await
            .unwrap();
        assert_eq!(pending, 2);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_without_closing() {
        let (ctx, _dir) = setup_test_db().await;
        let manager = JobManager::new(ctx.clone(), Arc::new(RecordingSource::default()), settings(3));
        let job = manager.create(JobType::Search, "US", &texas()).await.unwrap();

        let (tx, shutdown) = watch::channel(false);
        tx.send(true).unwrap();
        let outcome = manager.run(&job.id, &shutdown).await.unwrap();
        assert_eq!(outcome, RunOutcome::Interrupted);

        let paused = ctx.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(paused.status, JobStatus::Running);
        assert_eq!(paused.query_index, 0);
    }
}
