//! Frontier maintenance commands.

use std::time::Duration;

use chrono::Local;
use console::style;

use crate::cli::helpers::{format_number, open_db, truncate};
use crate::config::Settings;
use crate::discovery::{profile, validate_state};
use crate::models::{EnqueueOutcome, NewUrl, UrlSource, UrlStatus};
use crate::repository::FrontierError;
use crate::services::reclaim_all;

/// Add URLs to the frontier by hand.
pub async fn cmd_urls_add(
    settings: &Settings,
    urls: &[String],
    country: &str,
    state: Option<&str>,
    source: UrlSource,
) -> anyhow::Result<()> {
    let Some(country) = profile(country) else {
        anyhow::bail!("unknown country: {}", country);
    };
    if urls.is_empty() {
        println!("{} No URLs given", style("!").yellow());
        return Ok(());
    }
    let state = state
        .map(|s| validate_state(country.code, s))
        .filter(|s| !s.is_empty());

    let ctx = open_db(settings).await?;
    let frontier = ctx.frontier();
    let (mut added, mut known, mut invalid) = (0u64, 0u64, 0u64);

    for url in urls {
        let new_url = NewUrl::new(url.as_str(), source, "cli")
            .with_country(country.code)
            .with_state(state.clone());
        match frontier.enqueue(&new_url).await {
            Ok(EnqueueOutcome::Inserted) => {
                added += 1;
                println!("  {} {}", style("+").green(), url);
            }
            Ok(EnqueueOutcome::AlreadyPresent) => {
                known += 1;
                println!("  {} {} (already known)", style("=").dim(), url);
            }
            Err(FrontierError::InvalidUrl(_)) => {
                invalid += 1;
                println!("  {} {} (not a crawlable URL)", style("✗").red(), url);
            }
            Err(FrontierError::Storage(e)) => return Err(e.into()),
        }
    }

    println!(
        "{} {} added, {} already known, {} invalid",
        style("✓").green(),
        added,
        known,
        invalid
    );
    Ok(())
}

/// Return failed URLs to pending.
pub async fn cmd_urls_reset_failed(settings: &Settings, limit: Option<u32>) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let reset = ctx.frontier().reset_failed(limit).await?;
    println!(
        "{} Reset {} failed URLs to pending",
        style("✓").green(),
        format_number(reset)
    );
    Ok(())
}

/// Release claims held longer than the threshold.
pub async fn cmd_urls_reclaim(settings: &Settings, older_than_mins: Option<u64>) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let mut policy = settings.crawl.reclaim_policy();
    if let Some(mins) = older_than_mins {
        policy.older_than = Duration::from_secs(mins * 60);
    }

    let outcome = reclaim_all(&ctx, &policy).await?;
    println!(
        "{} Reclaimed {} URLs claimed more than {} minutes ago",
        style("✓").green(),
        format_number(outcome.released),
        policy.older_than.as_secs() / 60
    );
    if outcome.abandoned > 0 {
        println!(
            "  {} Failed {} URLs stalled more than {} times",
            style("!").yellow(),
            format_number(outcome.abandoned),
            policy.max_reclaims
        );
    }
    Ok(())
}

/// Frontier counts by status, plus recent rows for one status.
pub async fn cmd_urls_status(
    settings: &Settings,
    status: Option<UrlStatus>,
    limit: u32,
) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let frontier = ctx.frontier();
    let counts = frontier.count_by_status().await?;

    println!("{}", style("FRONTIER").cyan().bold());
    println!(
        "  {:<20} {:>10}",
        "total:",
        format_number(counts.values().sum())
    );
    for s in UrlStatus::ALL {
        println!(
            "  {:<20} {:>10}",
            format!("{}:", s.as_str()),
            format_number(counts.get(&s).copied().unwrap_or(0))
        );
    }

    let Some(status) = status else {
        return Ok(());
    };
    let rows = frontier.list(Some(status), limit).await?;
    println!();
    println!("{}", style(format!("RECENT {}", status.as_str().to_uppercase())).cyan().bold());
    if rows.is_empty() {
        println!("  (none)");
    }
    for row in rows {
        let when = row
            .processed_at
            .or(row.claimed_at)
            .unwrap_or(row.created_at)
            .with_timezone(&Local)
            .format("%m-%d %H:%M");
        let detail = match status {
            UrlStatus::Failed => row.error.clone().unwrap_or_default(),
            UrlStatus::Processing => row.claimed_by.clone().unwrap_or_default(),
            UrlStatus::Completed => format!("{} emails", row.emails_found),
            UrlStatus::Pending => row.source.as_str().to_string(),
        };
        println!("  {}  {:<60}  {}", when, truncate(&row.url, 60), style(truncate(&detail, 50)).dim());
    }
    Ok(())
}
