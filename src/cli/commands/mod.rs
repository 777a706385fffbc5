//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod crawl;
mod export;
mod init;
mod job;
mod serve;
mod stats;
mod urls;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::models::{JobType, UrlSource, UrlStatus};

#[derive(Parser)]
#[command(name = "herdscout")]
#[command(about = "Cattle farm contact discovery crawler")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "HERDSCOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory or database file (overrides config file)
    #[arg(short, long, global = true, env = "HERDSCOUT_DATA")]
    data: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Create, inspect and run scrape jobs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Run the crawl daemon: job drivers, worker pool and stale-claim recovery
    Crawl {
        /// Number of concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,
        /// Exit once no job is active and the frontier is empty
        #[arg(long)]
        once: bool,
        /// Create a full job for every active country without one
        #[arg(long)]
        auto_jobs: bool,
    },

    /// Process pending URLs until the frontier is empty (no job drivers)
    Work {
        /// Number of concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Inspect and repair the URL frontier
    Urls {
        #[command(subcommand)]
        command: UrlCommands,
    },

    /// Show crawl statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export all contacts as CSV
    Export {
        /// Output file ("-" for stdout)
        #[arg(short, long, default_value = "contacts.csv")]
        output: PathBuf,
    },

    /// Start the JSON API server
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(short, long, default_value = "3030", env = "PORT")]
        port: u16,
    },

    /// Check that the database is reachable
    Health,
}

#[derive(Subcommand)]
enum JobCommands {
    /// Queue a new job for a country
    Create {
        /// Country code (US, NZ, UK, CA, AU)
        country: String,
        /// Seed kinds to include
        #[arg(short = 't', long = "type", value_enum, default_value = "full")]
        job_type: JobType,
        /// Limit to these states/regions (comma separated or repeated)
        #[arg(short, long, value_delimiter = ',')]
        states: Vec<String>,
    },

    /// List recent jobs
    List {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show one job with its frontier breakdown
    Show { id: String },

    /// Cancel a queued or running job
    Cancel { id: String },

    /// Drive one job in the foreground with a local worker pool
    Run {
        id: String,
        /// Number of concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,
    },
}

#[derive(Subcommand)]
enum UrlCommands {
    /// Add URLs to the frontier
    Add {
        urls: Vec<String>,
        /// Country the URLs belong to
        #[arg(long, default_value = "US")]
        country: String,
        /// State/region hint for contacts found on these pages
        #[arg(long)]
        state: Option<String>,
        /// Treat the URLs as this kind of seed
        #[arg(long, value_enum, default_value = "manual")]
        source: UrlSource,
    },

    /// Return failed URLs to pending
    ResetFailed {
        /// Maximum number of URLs to reset
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Return claims older than the threshold to pending
    Reclaim {
        /// Claim age in minutes
        #[arg(long)]
        older_than: Option<u64>,
    },

    /// Frontier counts, optionally listing URLs with one status
    Status {
        #[arg(short, long, value_enum)]
        status: Option<UrlStatus>,
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data: cli.data,
    };
    let (mut settings, _config) =
        load_settings_with_options(options).await.map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Job { command } => match command {
            JobCommands::Create {
                country,
                job_type,
                states,
            } => job::cmd_job_create(&settings, &country, job_type, &states).await,
            JobCommands::List { limit } => job::cmd_job_list(&settings, limit).await,
            JobCommands::Show { id } => job::cmd_job_show(&settings, &id).await,
            JobCommands::Cancel { id } => job::cmd_job_cancel(&settings, &id).await,
            JobCommands::Run { id, workers } => {
                if let Some(workers) = workers {
                    settings.crawl.workers = workers.max(1);
                }
                job::cmd_job_run(&settings, &id).await
            }
        },
        Commands::Crawl {
            workers,
            once,
            auto_jobs,
        } => {
            if let Some(workers) = workers {
                settings.crawl.workers = workers.max(1);
            }
            crawl::cmd_crawl(&settings, once, auto_jobs).await
        }
        Commands::Work { workers } => {
            if let Some(workers) = workers {
                settings.crawl.workers = workers.max(1);
            }
            crawl::cmd_work(&settings).await
        }
        Commands::Urls { command } => match command {
            UrlCommands::Add {
                urls,
                country,
                state,
                source,
            } => urls::cmd_urls_add(&settings, &urls, &country, state.as_deref(), source).await,
            UrlCommands::ResetFailed { limit } => urls::cmd_urls_reset_failed(&settings, limit).await,
            UrlCommands::Reclaim { older_than } => urls::cmd_urls_reclaim(&settings, older_than).await,
            UrlCommands::Status { status, limit } => {
                urls::cmd_urls_status(&settings, status, limit).await
            }
        },
        Commands::Stats { json } => stats::cmd_stats(&settings, json).await,
        Commands::Export { output } => export::cmd_export(&settings, &output).await,
        Commands::Serve { host, port } => serve::cmd_serve(&settings, &host, port).await,
        Commands::Health => stats::cmd_health(&settings).await,
    }
}
