//! Scrape job and search query models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UrlSource;

/// Kind of seeds a job is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Search engine queries only.
    Search,
    /// Business directory listing pages.
    Directories,
    /// Breed and state cattlemen association pages.
    Associations,
    /// All of the above.
    Full,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Directories => "directories",
            Self::Associations => "associations",
            Self::Full => "full",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "search" => Some(Self::Search),
            "directories" => Some(Self::Directories),
            "associations" => Some(Self::Associations),
            "full" => Some(Self::Full),
            _ => None,
        }
    }

    pub fn includes_search(&self) -> bool {
        matches!(self, Self::Search | Self::Full)
    }

    pub fn includes_directories(&self) -> bool {
        matches!(self, Self::Directories | Self::Full)
    }

    pub fn includes_associations(&self) -> bool {
        matches!(self, Self::Associations | Self::Full)
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [Self::Queued, Self::Running, Self::Completed, Self::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a job's seed plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSeed {
    /// Issue a search query and enqueue its result URLs.
    Search {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
    /// Enqueue a listing page directly.
    Page {
        url: String,
        source: UrlSource,
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
}

impl JobSeed {
    pub fn region(&self) -> Option<&str> {
        match self {
            Self::Search { region, .. } | Self::Page { region, .. } => region.as_deref(),
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> &str {
        match self {
            Self::Search { query, .. } => query,
            Self::Page { url, .. } => url,
        }
    }
}

/// A scrape job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub id: String,
    pub job_type: JobType,
    pub country: String,
    pub states: Vec<String>,
    #[serde(skip)]
    pub seeds: Vec<JobSeed>,
    pub status: JobStatus,
    pub query_index: u32,
    pub total_queries: u32,
    pub urls_discovered: u32,
    pub urls_processed: u32,
    pub emails_found: u32,
    pub cancel_requested: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScrapeJob {
    /// Fraction of the seed plan already issued.
    pub fn progress(&self) -> f64 {
        if self.total_queries == 0 {
            return 1.0;
        }
        f64::from(self.query_index.min(self.total_queries)) / f64::from(self.total_queries)
    }

    /// Seeds not yet issued.
    pub fn remaining_seeds(&self) -> &[JobSeed] {
        let start = (self.query_index as usize).min(self.seeds.len());
        &self.seeds[start..]
    }
}

/// Record of an executed search query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub id: i32,
    pub query: String,
    pub results_count: u32,
    pub urls_found: u32,
    pub job_id: Option<String>,
    pub executed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_seed_serialization_is_tagged() {
        let seed = JobSeed::Page {
            url: "https://hereford.org/find-a-breeder".to_string(),
            source: UrlSource::Association,
            label: "American Hereford Association".to_string(),
            region: None,
        };
        let json = serde_json::to_string(&seed).unwrap();
        assert!(json.contains("\"kind\":\"page\""));
        assert!(json.contains("\"source\":\"association\""));
        let back: JobSeed = serde_json::from_str(&json).unwrap();
        assert_eq!(back, seed);
    }

    #[test]
    fn test_job_type_parts() {
        assert!(JobType::Full.includes_search());
        assert!(JobType::Full.includes_associations());
        assert!(!JobType::Search.includes_directories());
    }
}
