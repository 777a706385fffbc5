//! Configuration management for herdscout using the prefer crate.
//!
//! Precedence, lowest first: built-in defaults, the config file (explicit
//! `--config`, next to the data dir, or discovered by prefer), `--data`,
//! then environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::profile;
use crate::repository::util::{is_postgres_url, validate_database_url};
use crate::repository::pool::connections_for_workers;
use crate::repository::{DbContext, ReclaimPolicy};
use crate::scrapers::RateLimitConfig;
use crate::services::{JobSettings, WorkerConfig};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "herdscout.db";

/// Countries crawled by the daemon unless configured otherwise.
pub const DEFAULT_ACTIVE_COUNTRIES: &[&str] = &["US", "NZ", "UK", "CA", "AU"];

/// Crawl tuning knobs.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub workers: usize,
    pub batch_size: u32,
    pub request_timeout: Duration,
    /// Total fetch attempts per claim.
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
    /// Delay between requests to one domain.
    pub rate_limit_delay: Duration,
    pub results_per_query: usize,
    pub stale_claim_after: Duration,
    pub reclaim_batch: u32,
    pub reclaim_interval: Duration,
    /// Stale claims one URL survives before it is failed.
    pub max_reclaims: u32,
    pub idle_poll: Duration,
    pub drain_poll: Duration,
    pub max_consecutive_query_failures: u32,
    pub max_queries_per_job: usize,
    pub auto_job_cooldown: Duration,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            workers: 10,
            batch_size: 25,
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            rate_limit_delay: Duration::from_secs(2),
            results_per_query: 20,
            stale_claim_after: Duration::from_secs(15 * 60),
            reclaim_batch: 500,
            reclaim_interval: Duration::from_secs(5 * 60),
            max_reclaims: 3,
            idle_poll: Duration::from_secs(2),
            drain_poll: Duration::from_secs(2),
            max_consecutive_query_failures: 10,
            max_queries_per_job: 2000,
            auto_job_cooldown: Duration::from_secs(30),
        }
    }
}

impl CrawlSettings {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            workers: self.workers,
            batch_size: self.batch_size,
            fetch_timeout: self.request_timeout,
            max_attempts: self.max_attempts,
            retry_backoff: self.retry_backoff,
            max_backoff: self.max_backoff,
            idle_poll: self.idle_poll,
            until_idle: false,
        }
    }

    pub fn reclaim_policy(&self) -> ReclaimPolicy {
        ReclaimPolicy {
            older_than: self.stale_claim_after,
            max_rows: self.reclaim_batch,
            max_reclaims: self.max_reclaims,
        }
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            max_queries_per_job: self.max_queries_per_job,
            max_consecutive_query_failures: self.max_consecutive_query_failures,
            drain_poll: self.drain_poll,
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            base_delay: self.rate_limit_delay,
            ..Default::default()
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// `None` uses the crawler's own agent; see `scrapers::resolve_user_agent`.
    pub user_agent: Option<String>,
    pub respect_robots: bool,
    /// Country codes the daemon creates jobs for.
    pub active_countries: Vec<String>,
    pub crawl: CrawlSettings,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back: data dir -> home dir -> current dir
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("herdscout");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            user_agent: None,
            respect_robots: true,
            active_countries: DEFAULT_ACTIVE_COUNTRIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            crawl: CrawlSettings::default(),
        }
    }
}

impl Settings {
    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    pub fn is_postgres(&self) -> bool {
        self.database_url
            .as_ref()
            .is_some_and(|url| is_postgres_url(url))
    }

    /// Get the full path to the database (for SQLite file-based databases).
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Check if the database appears to be initialized.
    /// PostgreSQL is assumed to exist; connection errors surface later.
    pub fn database_exists(&self) -> bool {
        self.database_url.is_some() || self.database_path().exists()
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }

    pub fn create_db_context(&self) -> Result<DbContext, diesel::result::Error> {
        DbContext::from_url(
            &self.database_url(),
            connections_for_workers(self.crawl.workers),
        )
    }
}

/// Crawl section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Seconds between requests to one domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_per_query: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_claim_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reclaims: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queries_per_job: Option<usize>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respect_robots: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_countries: Option<Vec<String>>,
    #[serde(default)]
    pub crawl: CrawlConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover a herdscout config file in the standard locations.
    pub async fn load() -> Self {
        match prefer::load("herdscout").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await.unwrap_or_else(|e| {
                    tracing::warn!("{}", e);
                    Self::default()
                }),
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Parsed as TOML, YAML or JSON by extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config: Config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path relative to the base directory, expanding `~`.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = PathBuf::from(expanded.as_ref());
        if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        }
    }

    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref url) = self.database_url {
            settings.database_url = Some(url.clone());
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(respect) = self.respect_robots {
            settings.respect_robots = respect;
        }
        if let Some(ref countries) = self.active_countries {
            settings.active_countries = parse_countries(countries.iter().map(String::as_str));
        }

        let crawl = &mut settings.crawl;
        if let Some(workers) = self.crawl.workers {
            crawl.workers = workers.max(1);
        }
        if let Some(batch_size) = self.crawl.batch_size {
            crawl.batch_size = batch_size.max(1);
        }
        if let Some(secs) = self.crawl.request_timeout {
            crawl.request_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = self.crawl.max_retries {
            crawl.max_attempts = retries.max(1);
        }
        if let Some(delay) = self.crawl.rate_limit {
            crawl.rate_limit_delay = Duration::from_secs_f64(delay.max(0.0));
        }
        if let Some(results) = self.crawl.results_per_query {
            crawl.results_per_query = results;
        }
        if let Some(minutes) = self.crawl.stale_claim_minutes {
            crawl.stale_claim_after = Duration::from_secs(minutes * 60);
        }
        if let Some(max_reclaims) = self.crawl.max_reclaims {
            crawl.max_reclaims = max_reclaims;
        }
        if let Some(max_queries) = self.crawl.max_queries_per_job {
            crawl.max_queries_per_job = max_queries;
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory or database file (--data flag).
    pub data: Option<PathBuf>,
}

/// Keep known country codes, uppercased and deduplicated, in order.
fn parse_countries<'a>(codes: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut countries: Vec<String> = Vec::new();
    for code in codes {
        let code = code.trim().to_ascii_uppercase();
        if code.is_empty() {
            continue;
        }
        if profile(&code).is_none() {
            tracing::warn!("Ignoring unknown country code '{}'", code);
            continue;
        }
        if !countries.contains(&code) {
            countries.push(code);
        }
    }
    countries
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

fn is_db_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3")
        || path.is_file()
}

/// Look for a config file in the data directory.
fn find_config_in_dir(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["toml", "yaml", "yml", "json"];
    let basenames = ["herdscout", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_value(name)?;
    match raw.trim().parse() {
        Ok(value) => {
            tracing::debug!("Using {}={} from environment", name, raw);
            Some(value)
        }
        Err(_) => {
            tracing::warn!("Ignoring invalid {}='{}'", name, raw);
            None
        }
    }
}

/// Apply environment variable overrides. These take precedence over the
/// config file.
pub fn apply_env_overrides(settings: &mut Settings) -> Result<(), String> {
    if let Some(url) = env_value("DATABASE_URL") {
        validate_database_url(&url)?;
        tracing::debug!("Using DATABASE_URL from environment");
        settings.database_url = Some(url);
    }
    if let Some(workers) = env_parsed::<usize>("HERDSCOUT_WORKERS") {
        settings.crawl.workers = workers.max(1);
    }
    if let Some(batch_size) = env_parsed::<u32>("HERDSCOUT_BATCH_SIZE") {
        settings.crawl.batch_size = batch_size.max(1);
    }
    if let Some(secs) = env_parsed::<u64>("REQUEST_TIMEOUT") {
        settings.crawl.request_timeout = Duration::from_secs(secs);
    }
    if let Some(delay) = env_parsed::<f64>("DEFAULT_RATE_LIMIT") {
        settings.crawl.rate_limit_delay = Duration::from_secs_f64(delay.max(0.0));
    }
    if let Some(retries) = env_parsed::<u32>("MAX_RETRIES") {
        settings.crawl.max_attempts = retries.max(1);
    }
    if let Some(countries) = env_value("ACTIVE_COUNTRIES") {
        tracing::debug!("Using ACTIVE_COUNTRIES={} from environment", countries);
        settings.active_countries = parse_countries(countries.split(','));
    }
    if let Some(user_agent) = env_value("HERDSCOUT_USER_AGENT") {
        tracing::debug!("Using HERDSCOUT_USER_AGENT from environment");
        settings.user_agent = Some(user_agent);
    }
    Ok(())
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), String> {
    let data = options.data.as_deref().map(absolute);
    let data_dir = data.as_ref().map(|path| {
        if is_db_file(path) {
            path.parent().unwrap_or(Path::new(".")).to_path_buf()
        } else {
            path.clone()
        }
    });

    // Priority: --config, then a config in the data dir, then discovery
    let config = if let Some(ref path) = options.config_path {
        Config::load_from_path(path).await?
    } else if let Some(path) = data_dir.as_deref().and_then(find_config_in_dir) {
        tracing::debug!("Found config in data dir: {}", path.display());
        Config::load_from_path(&path).await?
    } else {
        Config::load().await
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(dir) = data_dir {
        settings.data_dir = dir;
    }
    if let Some(file) = data.as_deref().filter(|p| is_db_file(p)) {
        if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
            settings.database_filename = name.to_string();
        }
    }

    apply_env_overrides(&mut settings)?;
    Ok((settings, config))
}
