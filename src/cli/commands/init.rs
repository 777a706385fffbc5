//! Initialize command.

use console::style;

use crate::cli::helpers::open_db;
use crate::config::Settings;
use crate::repository::util::redact_url_password;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let existed = settings.is_postgres() || settings.database_exists();
    open_db(settings).await?;

    if existed {
        println!("{} Database schema is up to date", style("✓").green());
    } else {
        println!("  {} Created database", style("✓").green());
    }
    println!(
        "{} Initialized herdscout at {}",
        style("✓").green(),
        redact_url_password(&settings.database_url())
    );
    println!(
        "  Active countries: {}",
        settings.active_countries.join(", ")
    );
    println!(
        "  Next: {} or {}",
        style("herdscout job create US").cyan(),
        style("herdscout crawl --auto-jobs").cyan()
    );

    Ok(())
}
