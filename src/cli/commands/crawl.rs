//! Crawl daemon and standalone worker commands.

use std::sync::Arc;

use console::style;
use tokio::sync::mpsc;

use crate::cli::helpers::{
    build_fetcher, build_job_manager, build_worker_pool, format_number, open_db, spawn_progress,
};
use crate::config::Settings;
use crate::services::{shutdown_on_ctrl_c, Orchestrator, OrchestratorConfig, WorkerSummary};

fn orchestrator_config(settings: &Settings, once: bool, auto_jobs: bool) -> OrchestratorConfig {
    let crawl = &settings.crawl;
    OrchestratorConfig {
        auto_jobs,
        once,
        active_countries: settings.active_countries.clone(),
        reclaim: crawl.reclaim_policy(),
        reclaim_interval: crawl.reclaim_interval,
        auto_job_cooldown: crawl.auto_job_cooldown,
        poll: crawl.idle_poll,
    }
}

fn print_worker_summary(summary: &WorkerSummary) {
    println!(
        "  URLs:   {} completed, {} failed",
        format_number(summary.completed as u64),
        format_number(summary.failed as u64)
    );
    println!("  Emails: {}", format_number(summary.emails as u64));
}

/// Run the crawl daemon until Ctrl-C (or until idle with `--once`).
pub async fn cmd_crawl(settings: &Settings, once: bool, auto_jobs: bool) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let fetcher = build_fetcher(settings)?;
    let jobs = Arc::new(build_job_manager(&ctx, settings, &fetcher));
    let pool = Arc::new(build_worker_pool(&ctx, fetcher, settings.crawl.worker_config()));
    let orchestrator = Orchestrator::new(
        ctx,
        jobs,
        pool,
        orchestrator_config(settings, once, auto_jobs),
    );

    println!(
        "{} Crawling with {} workers{}{} (Ctrl-C to stop)",
        style("→").cyan(),
        settings.crawl.workers,
        if auto_jobs { ", auto jobs" } else { "" },
        if once { ", exiting when idle" } else { "" }
    );
    if auto_jobs {
        println!("  Countries: {}", settings.active_countries.join(", "));
    }

    let (event_tx, event_rx) = mpsc::channel(256);
    let progress = spawn_progress(event_rx);
    let result = orchestrator.run(shutdown_on_ctrl_c(), event_tx).await;
    let _ = progress.await;
    let summary = result?;

    println!("{} Crawl stopped", style("✓").green());
    if summary.reclaimed > 0 {
        println!("  Reclaimed {} stale claims", format_number(summary.reclaimed));
    }
    if summary.abandoned > 0 {
        println!(
            "  Failed {} URLs that stalled too often",
            format_number(summary.abandoned)
        );
    }
    println!(
        "  Jobs:   {} created, {} completed, {} cancelled, {} failed",
        summary.jobs_created, summary.jobs_completed, summary.jobs_cancelled, summary.jobs_failed
    );
    print_worker_summary(&summary.workers);
    Ok(())
}

/// Drain the frontier with a worker pool and exit.
pub async fn cmd_work(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let fetcher = build_fetcher(settings)?;
    let mut config = settings.crawl.worker_config();
    config.until_idle = true;
    let pool = build_worker_pool(&ctx, fetcher, config);

    println!(
        "{} Processing pending URLs with {} workers",
        style("→").cyan(),
        settings.crawl.workers
    );

    let (event_tx, event_rx) = mpsc::channel(256);
    let progress = spawn_progress(event_rx);
    let result = pool.run(shutdown_on_ctrl_c(), event_tx).await;
    let _ = progress.await;
    let summary = result?;

    println!("{} Frontier drained", style("✓").green());
    print_worker_summary(&summary);
    Ok(())
}
