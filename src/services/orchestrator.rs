//! Crawl daemon: stale-claim recovery, job drivers and the worker pool.
//!
//! One driver task runs per active job while a shared worker pool drains
//! the frontier. Ctrl-C stops everything between seeds and batches; running
//! jobs keep their status and cursor and are resumed on the next start.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::jobs::{JobError, JobManager, RunOutcome};
use super::worker::{WorkerEvent, WorkerPool, WorkerSummary};
use crate::models::{JobType, UrlStatus};
use crate::repository::{DbContext, DieselError, ReclaimOutcome, ReclaimPolicy};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Create a full job for every active country that has none.
    pub auto_jobs: bool,
    /// Exit once no job is active and the frontier is idle.
    pub once: bool,
    pub active_countries: Vec<String>,
    pub reclaim: ReclaimPolicy,
    pub reclaim_interval: Duration,
    pub auto_job_cooldown: Duration,
    pub poll: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            auto_jobs: false,
            once: false,
            active_countries: Vec::new(),
            reclaim: ReclaimPolicy::default(),
            reclaim_interval: Duration::from_secs(5 * 60),
            auto_job_cooldown: Duration::from_secs(30),
            poll: Duration::from_secs(2),
        }
    }
}

/// Totals for one daemon run.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrchestratorSummary {
    /// Stale claims returned to `pending`.
    pub reclaimed: u64,
    /// Stale claims failed for stalling too often.
    pub abandoned: u64,
    pub jobs_completed: usize,
    pub jobs_cancelled: usize,
    pub jobs_failed: usize,
    pub jobs_created: usize,
    pub workers: WorkerSummary,
}

pub struct Orchestrator {
    ctx: DbContext,
    jobs: Arc<JobManager>,
    pool: Arc<WorkerPool>,
    config: OrchestratorConfig,
}

type DriverHandle = JoinHandle<Result<RunOutcome, JobError>>;

impl Orchestrator {
    pub fn new(
        ctx: DbContext,
        jobs: Arc<JobManager>,
        pool: Arc<WorkerPool>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            ctx,
            jobs,
            pool,
            config,
        }
    }

    /// Recover every stale `processing` row, batch by batch.
    pub async fn reclaim_all_stale(&self) -> Result<ReclaimOutcome, DieselError> {
        reclaim_all(&self.ctx, &self.config.reclaim).await
    }

    pub async fn run(
        &self,
        shutdown: watch::Receiver<bool>,
        event_tx: mpsc::Sender<WorkerEvent>,
    ) -> anyhow::Result<OrchestratorSummary> {
        let startup = self.reclaim_all_stale().await?;
        let mut summary = OrchestratorSummary {
            reclaimed: startup.released,
            abandoned: startup.abandoned,
            ..Default::default()
        };
        if startup.total() > 0 {
            info!(
                "Recovered {} stale claims at startup ({} abandoned)",
                startup.total(),
                startup.abandoned
            );
        }

        // Workers and the reclaimer stop on Ctrl-C or when a `once` run is done
        let (stop_tx, stop_rx) = watch::channel(false);
        let forward = {
            let mut shutdown = shutdown.clone();
            let stop_tx = stop_tx.clone();
            tokio::spawn(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        return;
                    }
                }
                let _ = stop_tx.send(true);
            })
        };

        let reclaimer = self.spawn_reclaimer(stop_rx.clone());
        let workers = {
            let pool = self.pool.clone();
            let stop_rx = stop_rx.clone();
            tokio::spawn(async move { pool.run(stop_rx, event_tx).await })
        };

        let mut drivers: HashMap<String, DriverHandle> = HashMap::new();
        let mut last_auto: Option<Instant> = None;

        loop {
            reap_finished(&mut drivers, &mut summary).await;

            if *shutdown.borrow() {
                break;
            }

            match self.jobs.active().await {
                Ok(active) => {
                    for job in active {
                        if drivers.contains_key(&job.id) {
                            continue;
                        }
                        let jobs = self.jobs.clone();
                        let shutdown = shutdown.clone();
                        let id = job.id.clone();
                        info!("Driving {} job {} for {}", job.job_type, job.id, job.country);
                        drivers.insert(
                            job.id,
                            tokio::spawn(async move { jobs.run(&id, &shutdown).await }),
                        );
                    }
                }
                Err(e) => warn!("Failed to list active jobs: {}", e),
            }

            // A `once` run creates jobs a single time
            let due = match last_auto {
                None => true,
                Some(_) if self.config.once => false,
                Some(at) => at.elapsed() >= self.config.auto_job_cooldown,
            };
            if self.config.auto_jobs && due {
                last_auto = Some(Instant::now());
                let created = self.create_missing_jobs().await;
                summary.jobs_created += created;
                if created > 0 {
                    continue;
                }
            }

            if self.config.once && drivers.is_empty() && self.frontier_idle().await {
                info!("No active jobs and nothing left to crawl");
                break;
            }

            if wait(&shutdown, self.config.poll).await {
                break;
            }
        }

        let _ = stop_tx.send(true);

        for (id, handle) in drivers.drain() {
            finish_driver(&id, handle.await, &mut summary);
        }
        match workers.await {
            Ok(Ok(worker_summary)) => summary.workers = worker_summary,
            Ok(Err(e)) => error!("Worker pool failed: {}", e),
            Err(e) => error!("Worker pool task ended abnormally: {}", e),
        }
        let _ = reclaimer.await;
        forward.abort();

        Ok(summary)
    }

    /// Periodic stale-claim recovery until stopped.
    fn spawn_reclaimer(&self, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let ctx = self.ctx.clone();
        let interval = self.config.reclaim_interval;
        let policy = self.config.reclaim;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                match reclaim_all(&ctx, &policy).await {
                    Ok(outcome) if outcome.total() == 0 => debug!("No stale claims"),
                    Ok(outcome) => info!(
                        "Recovered {} stale claims ({} abandoned)",
                        outcome.total(),
                        outcome.abandoned
                    ),
                    Err(e) => warn!("Stale claim recovery failed: {}", e),
                }
            }
        })
    }

    /// Queue a full job for each active country without one.
    async fn create_missing_jobs(&self) -> usize {
        let mut created = 0;
        for country in &self.config.active_countries {
            match self.ctx.jobs().has_active_for(country).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to check jobs for {}: {}", country, e);
                    continue;
                }
            }
            match self.jobs.create(JobType::Full, country, &[]).await {
                Ok(job) => {
                    info!("Auto-created job {} for {}", job.id, country);
                    created += 1;
                }
                Err(e) => warn!("Failed to auto-create job for {}: {}", country, e),
            }
        }
        created
    }

    async fn frontier_idle(&self) -> bool {
        let frontier = self.ctx.frontier();
        let pending = frontier.count_with_status(UrlStatus::Pending).await;
        let processing = frontier.count_with_status(UrlStatus::Processing).await;
        matches!((pending, processing), (Ok(0), Ok(0)))
    }
}

/// Reclaim stale claims in batches until a batch comes back short.
pub async fn reclaim_all(ctx: &DbContext, policy: &ReclaimPolicy) -> Result<ReclaimOutcome, DieselError> {
    let frontier = ctx.frontier();
    let mut total = ReclaimOutcome::default();
    loop {
        let outcome = frontier.reclaim_stale(policy).await?;
        total += outcome;
        if outcome.total() < u64::from(policy.max_rows) {
            return Ok(total);
        }
    }
}

async fn reap_finished(drivers: &mut HashMap<String, DriverHandle>, summary: &mut OrchestratorSummary) {
    let finished: Vec<String> = drivers
        .iter()
        .filter(|(_, handle)| handle.is_finished())
        .map(|(id, _)| id.clone())
        .collect();
    for id in finished {
        if let Some(handle) = drivers.remove(&id) {
            finish_driver(&id, handle.await, summary);
        }
    }
}

fn finish_driver(
    id: &str,
    result: Result<Result<RunOutcome, JobError>, tokio::task::JoinError>,
    summary: &mut OrchestratorSummary,
) {
    match result {
        Ok(Ok(RunOutcome::Completed)) => summary.jobs_completed += 1,
        Ok(Ok(RunOutcome::Cancelled)) => summary.jobs_cancelled += 1,
        Ok(Ok(RunOutcome::Interrupted)) => info!("Job {} paused for resume", id),
        Ok(Err(e)) => {
            warn!("Job {} ended with error: {}", id, e);
            summary.jobs_failed += 1;
        }
        Err(e) => {
            error!("Driver for job {} ended abnormally: {}", id, e);
            summary.jobs_failed += 1;
        }
    }
}

/// Sleep for `poll`, waking early on shutdown. Returns true on shutdown.
async fn wait(shutdown: &watch::Receiver<bool>, poll: Duration) -> bool {
    let mut shutdown = shutdown.clone();
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(poll) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Shutdown signal that flips to true on Ctrl-C.
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, finishing current work");
                let _ = tx.send(true);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl-C: {}", e);
                // Keep the sender alive so receivers never see a closed channel
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}
