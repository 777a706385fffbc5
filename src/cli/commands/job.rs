//! Job commands.

use chrono::Local;
use console::style;
use tokio::sync::{mpsc, watch};

use crate::cli::helpers::{
    build_fetcher, build_job_manager, build_worker_pool, format_number, open_db, spawn_progress,
    truncate,
};
use crate::config::Settings;
use crate::discovery::country_name;
use crate::models::{JobStatus, JobType, ScrapeJob, UrlStatus};
use crate::services::{shutdown_on_ctrl_c, CancelOutcome, RunOutcome};

fn styled_status(status: JobStatus) -> String {
    let label = status.as_str();
    match status {
        JobStatus::Queued => style(label).dim().to_string(),
        JobStatus::Running => style(label).cyan().to_string(),
        JobStatus::Completed => style(label).green().to_string(),
        JobStatus::Failed => style(label).red().to_string(),
    }
}

/// Queue a new job.
pub async fn cmd_job_create(
    settings: &Settings,
    country: &str,
    job_type: JobType,
    states: &[String],
) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let fetcher = build_fetcher(settings)?;
    let manager = build_job_manager(&ctx, settings, &fetcher);

    let job = manager.create(job_type, country, states).await?;
    println!(
        "{} Queued {} job {} for {}",
        style("✓").green(),
        job.job_type,
        style(&job.id).bold(),
        country_name(&job.country).unwrap_or(&job.country)
    );
    if !job.states.is_empty() {
        println!("  Regions: {}", job.states.join(", "));
    }
    println!("  Seeds:   {}", format_number(u64::from(job.total_queries)));
    Ok(())
}

/// List recent jobs.
pub async fn cmd_job_list(settings: &Settings, limit: u32) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let jobs = ctx.jobs().list(limit).await?;

    if jobs.is_empty() {
        println!("{} No jobs yet", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<38} {:<12} {:<8} {:<11} {:>9} {:>9} {:>8}",
        "ID", "TYPE", "COUNTRY", "STATUS", "PROGRESS", "URLS", "EMAILS"
    );
    println!("{}", "─".repeat(100));
    for job in &jobs {
        println!(
            "{:<38} {:<12} {:<8} {:<20} {:>8.1}% {:>9} {:>8}",
            job.id,
            job.job_type.as_str(),
            job.country,
            styled_status(job.status),
            job.progress() * 100.0,
            format_number(u64::from(job.urls_discovered)),
            format_number(u64::from(job.emails_found)),
        );
    }
    Ok(())
}

/// Show one job in detail.
pub async fn cmd_job_show(settings: &Settings, id: &str) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let Some(job) = ctx.jobs().get(id).await? else {
        anyhow::bail!("job not found: {}", id);
    };
    print_job(&job);

    let frontier = ctx.frontier();
    println!();
    println!("{}", style("FRONTIER").cyan().bold());
    for status in UrlStatus::ALL {
        let count = frontier.count_for_job(id, &[status]).await?;
        println!(
            "  {:<20} {:>10}",
            format!("{}:", status.as_str()),
            format_number(count)
        );
    }
    Ok(())
}

fn print_job(job: &ScrapeJob) {
    println!("{} {}", style("Job").bold(), style(&job.id).bold());
    println!("  Type:       {}", job.job_type);
    println!(
        "  Country:    {} ({})",
        country_name(&job.country).unwrap_or("Unknown"),
        job.country
    );
    if !job.states.is_empty() {
        println!("  Regions:    {}", truncate(&job.states.join(", "), 70));
    }
    println!("  Status:     {}", styled_status(job.status));
    if job.cancel_requested && job.status == JobStatus::Running {
        println!("              {}", style("cancellation requested").yellow());
    }
    println!(
        "  Progress:   {}/{} seeds ({:.1}%)",
        job.query_index,
        job.total_queries,
        job.progress() * 100.0
    );
    println!(
        "  URLs:       {} discovered, {} processed",
        format_number(u64::from(job.urls_discovered)),
        format_number(u64::from(job.urls_processed))
    );
    println!("  Emails:     {}", format_number(u64::from(job.emails_found)));
    println!(
        "  Created:    {}",
        job.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(started) = job.started_at {
        println!(
            "  Started:    {}",
            started.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    if let Some(finished) = job.completed_at {
        println!(
            "  Finished:   {}",
            finished.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    if let Some(ref error) = job.error {
        println!("  Error:      {}", style(error).red());
    }
}

/// Cancel a job.
pub async fn cmd_job_cancel(settings: &Settings, id: &str) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let fetcher = build_fetcher(settings)?;
    let manager = build_job_manager(&ctx, settings, &fetcher);

    match manager.cancel(id).await? {
        CancelOutcome::Cancelled => {
            println!("{} Cancelled job {}", style("✓").green(), id);
        }
        CancelOutcome::Requested => {
            println!(
                "{} Cancellation requested for {}; its driver stops after in-flight URLs finish",
                style("→").cyan(),
                id
            );
        }
    }
    Ok(())
}

/// Drive one job in the foreground.
///
/// A local worker pool drains the job's URLs while the driver issues seeds.
pub async fn cmd_job_run(settings: &Settings, id: &str) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let fetcher = build_fetcher(settings)?;
    let manager = build_job_manager(&ctx, settings, &fetcher);
    let pool = build_worker_pool(&ctx, fetcher, settings.crawl.worker_config());

    let shutdown = shutdown_on_ctrl_c();
    let (stop_tx, stop_rx) = watch::channel(false);
    let (event_tx, event_rx) = mpsc::channel(256);
    let progress = spawn_progress(event_rx);

    println!(
        "{} Running job {} with {} workers (Ctrl-C to stop)",
        style("→").cyan(),
        id,
        settings.crawl.workers
    );
    let workers = tokio::spawn(async move { pool.run(stop_rx, event_tx).await });

    let outcome = manager.run(id, &shutdown).await;
    let _ = stop_tx.send(true);
    let summary = workers.await??;
    let _ = progress.await;

    match outcome? {
        RunOutcome::Completed => println!("{} Job {} completed", style("✓").green(), id),
        RunOutcome::Cancelled => println!("{} Job {} cancelled", style("!").yellow(), id),
        RunOutcome::Interrupted => println!(
            "{} Interrupted; job {} stays running and resumes on the next run",
            style("!").yellow(),
            id
        ),
    }
    println!(
        "  {} URLs completed, {} failed, {} emails",
        format_number(summary.completed as u64),
        format_number(summary.failed as u64),
        format_number(summary.emails as u64)
    );
    Ok(())
}
