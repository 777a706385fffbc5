//! Page fetching.
//!
//! The crawl pipeline only sees the [`Fetcher`] trait. [`HttpFetcher`] is the
//! production implementation: reqwest with per-domain rate limiting and a
//! robots.txt check.

mod http_client;
pub mod rate_limiter;
pub mod robots;

pub use http_client::{resolve_user_agent, HttpFetcher, ROBOTS_AGENT, USER_AGENT};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use robots::{RobotsChecker, RobotsTxt};

use async_trait::async_trait;
use thiserror::Error;

/// A successfully fetched HTML page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    pub html: String,
    pub status_code: u16,
}

/// Whether a failed fetch is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Timeouts, connection resets, 5xx, 429.
    Transient,
    /// 404, robots.txt blocks, non-HTML content, malformed URLs.
    Permanent,
}

#[derive(Debug, Clone, Error)]
#[error("{detail}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub detail: String,
}

impl FetchError {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            detail: detail.into(),
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Permanent,
            detail: detail.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FetchErrorKind::Transient
    }

    /// Classify an HTTP status that is not a success.
    pub fn from_status(status: u16) -> Self {
        let detail = format!("HTTP {}", status);
        match status {
            408 | 425 | 429 | 500..=599 => Self::transient(detail),
            _ => Self::permanent(detail),
        }
    }
}

/// Retrieves a page for extraction.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(FetchError::from_status(503).is_transient());
        assert!(FetchError::from_status(429).is_transient());
        assert!(FetchError::from_status(408).is_transient());
        assert!(!FetchError::from_status(404).is_transient());
        assert!(!FetchError::from_status(403).is_transient());
        assert_eq!(FetchError::from_status(410).to_string(), "HTTP 410");
    }
}
