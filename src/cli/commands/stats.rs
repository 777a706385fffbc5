//! Stats and health commands.

use std::time::Duration;

use chrono::Local;
use console::style;

use crate::cli::helpers::{format_number, open_db, truncate};
use crate::config::Settings;
use crate::discovery::country_name;
use crate::repository::util::redact_url_password;

/// Rows shown in the recent contacts and searches sections.
const RECENT_LIMIT: u32 = 5;

/// Print crawl statistics.
pub async fn cmd_stats(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let metrics = ctx.metrics();
    let dashboard = metrics.dashboard().await?;
    let countries = metrics.emails_per_country().await?;
    let states = metrics.emails_per_state().await?;
    let recent_contacts = ctx.contacts().recent(RECENT_LIMIT).await?;
    let recent_queries = ctx.search_queries().recent(RECENT_LIMIT).await?;

    if json {
        let hourly = metrics.hourly(Duration::from_secs(24 * 3600)).await?;
        let out = serde_json::json!({
            "dashboard": dashboard,
            "countries": countries,
            "states": states,
            "hourly": hourly,
            "recent_contacts": recent_contacts,
            "recent_queries": recent_queries,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "{:<50} {}",
        style("herdscout stats").bold(),
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!("{}", "─".repeat(70));
    println!("Database: {}", redact_url_password(&settings.database_url()));
    println!();

    println!("{}", style("CONTACTS").cyan().bold());
    println!(
        "  {:<20} {:>10}",
        "Total:",
        format_number(dashboard.total_contacts)
    );
    println!(
        "  {:<20} {:>10}",
        "Last hour:",
        format_number(dashboard.contacts_last_hour)
    );
    println!();

    println!("{}", style("FRONTIER").cyan().bold());
    println!("  {:<20} {:>10}", "Total:", format_number(dashboard.total_urls));
    for (status, count) in &dashboard.urls_by_status {
        println!(
            "  {:<20} {:>10}",
            format!("{}:", status),
            format_number(*count)
        );
    }
    println!(
        "  {:<20} {:>10}",
        "Done last hour:",
        format_number(dashboard.urls_processed_last_hour)
    );
    println!(
        "  {:<20} {:>10}",
        "Queries run:",
        format_number(dashboard.queries_executed)
    );
    println!();

    println!("{}", style("JOBS").cyan().bold());
    for (status, count) in &dashboard.jobs_by_status {
        println!(
            "  {:<20} {:>10}",
            format!("{}:", status),
            format_number(*count)
        );
    }

    if !countries.is_empty() {
        println!();
        println!("{}", style("BY COUNTRY").cyan().bold());
        for entry in &countries {
            let name = country_name(&entry.label).unwrap_or(entry.label.as_str());
            println!("  {:<20} {:>10}", name, format_number(entry.count));
        }
    }

    if !states.is_empty() {
        println!();
        println!("{}", style("TOP STATES").cyan().bold());
        for entry in states.iter().take(10) {
            println!("  {:<20} {:>10}", entry.label, format_number(entry.count));
        }
    }

    if !recent_contacts.is_empty() {
        println!();
        println!("{}", style("RECENT CONTACTS").cyan().bold());
        for contact in &recent_contacts {
            let record = &contact.record;
            println!(
                "  {}  {:<36} {:<28} {}",
                contact.created_at.with_timezone(&Local).format("%m-%d %H:%M"),
                truncate(&record.email, 36),
                truncate(&record.farm_name, 28),
                style(&record.state).dim()
            );
        }
    }

    if !recent_queries.is_empty() {
        println!();
        println!("{}", style("RECENT SEARCHES").cyan().bold());
        for query in &recent_queries {
            println!(
                "  {}  {:<50} {:>4} results",
                query.executed_at.with_timezone(&Local).format("%m-%d %H:%M"),
                truncate(&query.query, 50),
                query.results_count
            );
        }
    }
    println!();
    Ok(())
}

/// Exit non-zero unless the database answers.
pub async fn cmd_health(settings: &Settings) -> anyhow::Result<()> {
    let url = redact_url_password(&settings.database_url());
    let ctx = settings.create_db_context()?;
    match ctx.ping().await {
        Ok(()) => {
            println!("{} Database reachable: {}", style("✓").green(), url);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} Database unreachable: {}", style("✗").red(), url);
            Err(anyhow::anyhow!("health check failed: {}", e))
        }
    }
}
