//! Web server command.

use console::style;

use crate::config::Settings;

/// Start the JSON API server.
pub async fn cmd_serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    println!(
        "{} Starting herdscout API at http://{}:{}",
        style("→").cyan(),
        host,
        port
    );
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings, host, port).await
}
