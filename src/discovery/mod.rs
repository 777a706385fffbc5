//! URL discovery: search query sources, country profiles and seed plans.

pub mod countries;
mod duckduckgo;
pub mod plan;

pub use countries::{
    country_name, normalize_region, profile, validate_state, CountryProfile, COUNTRIES,
};
pub use duckduckgo::{extract_url, DuckDuckGoSource};
pub use plan::{build_plan, resolve_regions};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Rate limited by source: {0}")]
    RateLimited(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Runs one search query and returns result URLs.
#[async_trait]
pub trait QuerySource: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<String>, DiscoveryError>;
}
