//! Frontier URL model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Processing status of a frontier URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    /// Discovered and waiting for a worker.
    Pending,
    /// Claimed by exactly one worker.
    Processing,
    /// Fetched and extracted.
    Completed,
    /// Terminal failure, reason recorded on the row.
    Failed,
}

impl UrlStatus {
    pub const ALL: [UrlStatus; 4] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the frontier allows moving from `self` to `next`.
    ///
    /// Terminal rows only go back to pending through an explicit operator reset,
    /// and processing rows go back to pending only through stale reclaim.
    pub fn can_transition_to(&self, next: UrlStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
                | (Self::Processing, Self::Pending)
                | (Self::Failed, Self::Pending)
        )
    }
}

impl std::fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a URL was first discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UrlSource {
    Search,
    Directory,
    Association,
    Manual,
}

impl UrlSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Directory => "directory",
            Self::Association => "association",
            Self::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "search" => Some(Self::Search),
            "directory" => Some(Self::Directory),
            "association" => Some(Self::Association),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    /// Listing pages link out to many farm sites rather than being one.
    pub fn is_listing(&self) -> bool {
        matches!(self, Self::Directory | Self::Association)
    }
}

impl std::fmt::Display for UrlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of the URL frontier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlUrl {
    pub id: i32,
    pub url: String,
    pub status: UrlStatus,
    pub source: UrlSource,
    pub discovered_by: String,
    pub state_target: Option<String>,
    pub country: String,
    pub job_id: Option<String>,
    pub emails_found: u32,
    pub attempts: u32,
    pub error: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Times stale-claim recovery has returned this row to `pending`.
    pub reclaims: u32,
}

/// A URL about to enter the frontier.
#[derive(Debug, Clone)]
pub struct NewUrl {
    pub url: String,
    pub source: UrlSource,
    pub discovered_by: String,
    pub state_target: Option<String>,
    pub country: String,
    pub job_id: Option<String>,
}

impl NewUrl {
    pub fn new(url: impl Into<String>, source: UrlSource, discovered_by: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source,
            discovered_by: discovered_by.into(),
            state_target: None,
            country: "US".to_string(),
            job_id: None,
        }
    }

    pub fn with_state(mut self, state: Option<String>) -> Self {
        self.state_target = state;
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn with_job(mut self, job_id: Option<String>) -> Self {
        self.job_id = job_id;
        self
    }
}

/// Result of putting a URL into the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Inserted,
    AlreadyPresent,
}

const TRACKING_PARAMS: &[&str] = &["gclid", "fbclid", "msclkid"];

/// Normalize a URL to its frontier identity.
///
/// Returns `None` for anything that is not an absolute http(s) URL with a host.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    let mut normalized = url.to_string();
    if url.query().is_none() && normalized.ends_with('/') {
        normalized.pop();
    }
    Some(normalized)
}

/// Host of a URL without a leading `www.`.
pub fn registrable_host(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}
