//! Crawl worker pool.
//!
//! N tokio workers claim batches from the frontier and drive every claimed
//! URL to `completed` or `failed`. Separated from UI concerns; progress is
//! reported through [`WorkerEvent`]s.

mod processor;
mod types;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::extract::Extractor;
use crate::models::UrlStatus;
use crate::repository::DbContext;
use crate::scrapers::Fetcher;

pub use processor::{UrlProcessor, CRAWLER_TAG};
pub use types::{UrlOutcome, WorkerConfig, WorkerEvent, WorkerSummary};

/// Pool of crawl workers sharing one frontier and contact store.
pub struct WorkerPool {
    ctx: DbContext,
    processor: Arc<UrlProcessor>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(
        ctx: DbContext,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        config: WorkerConfig,
    ) -> Self {
        let processor = Arc::new(UrlProcessor::new(
            ctx.clone(),
            fetcher,
            extractor,
            config.clone(),
        ));
        Self {
            ctx,
            processor,
            config,
        }
    }

    /// Run all workers until shutdown is signalled, or until the frontier
    /// has nothing pending when `until_idle` is set.
    ///
    /// Workers finish the batch in hand before honouring shutdown.
    pub async fn run(
        &self,
        shutdown: watch::Receiver<bool>,
        event_tx: mpsc::Sender<WorkerEvent>,
    ) -> anyhow::Result<WorkerSummary> {
        let completed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let emails = Arc::new(AtomicUsize::new(0));

        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        let pid = std::process::id();

        info!(
            "Starting {} workers (batch size {})",
            self.config.workers, self.config.batch_size
        );

        let mut handles = Vec::with_capacity(self.config.workers);

        for worker_id in 0..self.config.workers {
            let ctx = self.ctx.clone();
            let processor = self.processor.clone();
            let config = self.config.clone();
            let claimant = format!("{}:{}:w{}", host, pid, worker_id);
            let mut shutdown = shutdown.clone();
            let completed = completed.clone();
            let failed = failed.clone();
            let emails = emails.clone();
            let event_tx = event_tx.clone();

            let handle = tokio::spawn(async move {
                loop {
                    if *shutdown.borrow() {
                        break;
                    }

                    let batch = match ctx.frontier().claim_next(config.batch_size, &claimant).await
                    {
                        Ok(batch) => batch,
                        Err(e) => {
                            warn!("Worker {} failed to claim: {}", worker_id, e);
                            if idle(&mut shutdown, config.idle_poll).await {
                                break;
                            }
                            continue;
                        }
                    };

                    if batch.is_empty() {
                        if config.until_idle {
                            match ctx.frontier().count_with_status(UrlStatus::Pending).await {
                                Ok(0) => break,
                                Ok(_) => {}
                                Err(e) => warn!("Worker {} failed to count pending: {}", worker_id, e),
                            }
                        }
                        if idle(&mut shutdown, config.idle_poll).await {
                            break;
                        }
                        continue;
                    }

                    let _ = event_tx
                        .send(WorkerEvent::Claimed {
                            worker_id,
                            count: batch.len(),
                        })
                        .await;

                    for url in batch {
                        let task_processor = processor.clone();
                        let task_url = url.clone();
                        let result =
                            tokio::spawn(async move { task_processor.process(&task_url).await })
                                .await;

                        let outcome = match result {
                            Ok(Ok(outcome)) => outcome,
                            Ok(Err(e)) => {
                                // Row stays processing; stale-claim recovery returns it.
                                error!("Storage error processing {}: {}", url.url, e);
                                continue;
                            }
                            Err(join_error) => {
                                let message = format!("worker panicked: {}", join_error);
                                error!("{} while processing {}", message, url.url);
                                if let Err(e) = ctx.frontier().fail(url.id, &message).await {
                                    error!("Failed to record panic for {}: {}", url.url, e);
                                }
                                UrlOutcome::Failed { error: message }
                            }
                        };

                        let event = match outcome {
                            UrlOutcome::Completed { emails: found, .. } => {
                                completed.fetch_add(1, Ordering::Relaxed);
                                emails.fetch_add(found as usize, Ordering::Relaxed);
                                WorkerEvent::Completed {
                                    worker_id,
                                    url: url.url,
                                    emails: found,
                                    skipped: false,
                                }
                            }
                            UrlOutcome::Skipped { emails: found } => {
                                completed.fetch_add(1, Ordering::Relaxed);
                                WorkerEvent::Completed {
                                    worker_id,
                                    url: url.url,
                                    emails: found,
                                    skipped: true,
                                }
                            }
                            UrlOutcome::Failed { error } => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                WorkerEvent::Failed {
                                    worker_id,
                                    url: url.url,
                                    error,
                                }
                            }
                        };
                        let _ = event_tx.send(event).await;
                    }
                }

                debug!("Worker {} stopped", worker_id);
                let _ = event_tx.send(WorkerEvent::Stopped { worker_id }).await;
            });

            handles.push(handle);
        }

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Worker task ended abnormally: {}", e);
            }
        }

        Ok(WorkerSummary {
            completed: completed.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            emails: emails.load(Ordering::Relaxed),
        })
    }
}

/// Sleep for `poll`, waking early on shutdown. Returns true if shutdown
/// was signalled.
async fn idle(shutdown: &mut watch::Receiver<bool>, poll: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(poll) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{Extraction, ExtractionError};
    use crate::models::{ContactRecord, JobType, NewUrl, UrlSource};
    use crate::repository::test_support::setup_test_db;
    use crate::scrapers::{FetchError, FetchedPage};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Serves fixed HTML, failing transiently for the first `failures` calls.
    struct FlakyFetcher {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetcher for FlakyFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(FetchError::transient("connection reset"));
            }
            if url.contains("missing") {
                return Err(FetchError::permanent("HTTP 404"));
            }
            Ok(FetchedPage {
                url: url.to_string(),
                html: "<html></html>".to_string(),
                status_code: 200,
            })
        }
    }

    /// One contact per page, plus a contact link.
    struct OneContact;

    impl Extractor for OneContact {
        fn extract(&self, _html: &str, source_url: &str) -> Result<Extraction, ExtractionError> {
            let host = url::Url::parse(source_url)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.to_string()))
                .unwrap_or_default();
            Ok(Extraction {
                contacts: vec![ContactRecord {
                    email: format!("info@{}", host),
                    state: "TX".to_string(),
                    source_url: source_url.to_string(),
                    ..Default::default()
                }],
                discovered_urls: vec![],
                contact_links: vec![],
            })
        }
    }

    struct Panicking;

    impl Extractor for Panicking {
        fn extract(&self, _html: &str, _source_url: &str) -> Result<Extraction, ExtractionError> {
            panic!("bad page");
        }
    }

    fn fast_config(workers: usize) -> WorkerConfig {
        WorkerConfig {
            workers,
            batch_size: 2,
            fetch_timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            idle_poll: Duration::from_millis(10),
            until_idle: true,
        }
    }

    async fn run_pool(pool: &WorkerPool) -> WorkerSummary {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let drain = tokio::spawn(async move { while event_rx.recv().await.is_some() {} });
        let summary = pool.run(shutdown_rx, event_tx).await.unwrap();
        drain.await.unwrap();
        summary
    }

    #[tokio::test]
    async fn test_pool_processes_until_idle() {
        let (ctx, _dir) = setup_test_db().await;
        let urls: Vec<NewUrl> = ["https://a-ranch.com", "https://b-ranch.com", "https://missing.com"]
            .iter()
            .map(|u| NewUrl::new(*u, UrlSource::Search, "test").with_country("US"))
            .collect();
        ctx.frontier().enqueue_many(&urls).await.unwrap();

        let fetcher = Arc::new(FlakyFetcher {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let pool = WorkerPool::new(ctx.clone(), fetcher, Arc::new(OneContact), fast_config(2));
        let summary = run_pool(&pool).await;

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.emails, 2);

        let contact = ctx
            .contacts()
            .get_by_email("info@a-ranch.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contact.record.state, "Texas");
        assert_eq!(contact.record.country, "US");

        let missing = ctx.frontier().get_by_url("https://missing.com").await.unwrap().unwrap();
        assert_eq!(missing.status, UrlStatus::Failed);
        assert_eq!(missing.attempts, 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let (ctx, _dir) = setup_test_db().await;
        ctx.frontier()
            .enqueue(&NewUrl::new("https://a-ranch.com", UrlSource::Search, "test").with_country("US"))
            .await
            .unwrap();

        let fetcher = Arc::new(FlakyFetcher {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let pool = WorkerPool::new(ctx.clone(), fetcher, Arc::new(OneContact), fast_config(1));
        let summary = run_pool(&pool).await;
        assert_eq!(summary.completed, 1);

        let url = ctx.frontier().get_by_url("https://a-ranch.com").await.unwrap().unwrap();
        assert_eq!(url.status, UrlStatus::Completed);
        assert_eq!(url.attempts, 3);
        assert_eq!(url.emails_found, 1);
    }

    #[tokio::test]
    async fn test_known_source_is_not_fetched_again() {
        let (ctx, _dir) = setup_test_db().await;
        ctx.contacts()
            .upsert(&ContactRecord {
                email: "owner@a-ranch.com".to_string(),
                source_url: "https://a-ranch.com".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let job = ctx.jobs().create(JobType::Search, "US", &[], &[]).await.unwrap();
        ctx.frontier()
            .enqueue(
                &NewUrl::new("https://a-ranch.com", UrlSource::Search, "test")
                    .with_job(Some(job.id.clone())),
            )
            .await
            .unwrap();

        let fetcher = Arc::new(FlakyFetcher {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let pool = WorkerPool::new(ctx.clone(), fetcher.clone(), Arc::new(OneContact), fast_config(1));
        let summary = run_pool(&pool).await;

        assert_eq!(summary.completed, 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        let url = ctx.frontier().get_by_url("https://a-ranch.com").await.unwrap().unwrap();
        assert_eq!(url.status, UrlStatus::Completed);
        assert_eq!(url.emails_found, 1);

        // The job counts the skipped page's emails like any other completion
        let job = ctx.jobs().get(&job.id).await.unwrap().unwrap();
        assert_eq!(job.urls_processed, 1);
        assert_eq!(job.emails_found, url.emails_found);
    }

    #[tokio::test]
    async fn test_extractor_panic_fails_url() {
        let (ctx, _dir) = setup_test_db().await;
        ctx.frontier()
            .enqueue(&NewUrl::new("https://a-ranch.com", UrlSource::Search, "test"))
            .await
            .unwrap();

        let fetcher = Arc::new(FlakyFetcher {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let pool = WorkerPool::new(ctx.clone(), fetcher, Arc::new(Panicking), fast_config(1));
        let summary = run_pool(&pool).await;
        assert_eq!(summary.failed, 1);

        let url = ctx.frontier().get_by_url("https://a-ranch.com").await.unwrap().unwrap();
        assert_eq!(url.status, UrlStatus::Failed);
        assert!(url.error.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_workers() {
        let (ctx, _dir) = setup_test_db().await;
        let fetcher = Arc::new(FlakyFetcher {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let mut config = fast_config(3);
        config.until_idle = false;
        config.idle_poll = Duration::from_secs(60);
        let pool = WorkerPool::new(ctx, fetcher, Arc::new(OneContact), config);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let run = tokio::spawn(async move { pool.run(shutdown_rx, event_tx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("pool did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(summary, WorkerSummary::default());

        let mut stopped = 0;
        while let Some(event) = event_rx.recv().await {
            if matches!(event, WorkerEvent::Stopped { .. }) {
                stopped += 1;
            }
        }
        assert_eq!(stopped, 3);
    }
}
