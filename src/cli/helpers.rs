//! Shared helpers for CLI commands.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Settings;
use crate::discovery::DuckDuckGoSource;
use crate::extract::PageExtractor;
use crate::repository::DbContext;
use crate::scrapers::{HttpFetcher, RateLimiter};
use crate::services::{JobManager, WorkerConfig, WorkerEvent, WorkerPool};

/// Open the configured database, creating tables on first use.
pub async fn open_db(settings: &Settings) -> anyhow::Result<DbContext> {
    if !settings.is_postgres() {
        settings.ensure_directories()?;
    }
    let ctx = settings.create_db_context()?;
    ctx.init_schema().await?;
    debug!("Opened {} store", ctx.pool().backend());
    Ok(ctx)
}

/// Production fetcher with the configured timeout, agent and per-domain delay.
pub fn build_fetcher(settings: &Settings) -> anyhow::Result<Arc<HttpFetcher>> {
    let limiter = RateLimiter::with_config(settings.crawl.rate_limit_config());
    let fetcher = HttpFetcher::new(
        settings.crawl.request_timeout,
        limiter,
        settings.user_agent.as_deref(),
        settings.respect_robots,
    )?;
    Ok(Arc::new(fetcher))
}

/// Job manager backed by DuckDuckGo. Search shares the fetcher's client and
/// rate limiter so the search host is throttled like any other domain.
pub fn build_job_manager(ctx: &DbContext, settings: &Settings, fetcher: &HttpFetcher) -> JobManager {
    let source = DuckDuckGoSource::new(
        fetcher.client().clone(),
        fetcher.rate_limiter().clone(),
        settings.crawl.results_per_query,
    );
    JobManager::new(ctx.clone(), Arc::new(source), settings.crawl.job_settings())
}

pub fn build_worker_pool(
    ctx: &DbContext,
    fetcher: Arc<HttpFetcher>,
    config: WorkerConfig,
) -> WorkerPool {
    WorkerPool::new(ctx.clone(), fetcher, Arc::new(PageExtractor::new()), config)
}

/// Render worker events on a spinner until the sender side closes.
pub fn spawn_progress(mut rx: mpsc::Receiver<WorkerEvent>) -> JoinHandle<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("waiting for work");

    tokio::spawn(async move {
        let (mut completed, mut failed, mut emails) = (0u64, 0u64, 0u64);
        while let Some(event) = rx.recv().await {
            let last = match event {
                WorkerEvent::Completed {
                    url, emails: found, ..
                } => {
                    completed += 1;
                    emails += u64::from(found);
                    url
                }
                WorkerEvent::Failed { url, error, .. } => {
                    failed += 1;
                    pb.println(format!("  {} {} ({})", style("✗").red(), url, error));
                    url
                }
                WorkerEvent::Claimed { .. } | WorkerEvent::Stopped { .. } => continue,
            };
            pb.set_message(format!(
                "{} done, {} failed, {} emails | {}",
                format_number(completed),
                format_number(failed),
                format_number(emails),
                truncate(&last, 60)
            ));
        }
        pb.finish_and_clear();
    })
}

/// Format a number with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();
    let chunks: Vec<_> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();
    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Truncate to `max_chars` characters with an ellipsis.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
