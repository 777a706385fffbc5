//! reqwest-backed page fetcher.

mod user_agent;

pub use user_agent::{resolve_user_agent, ROBOTS_AGENT, USER_AGENT};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use super::rate_limiter::RateLimiter;
use super::robots::RobotsChecker;
use super::{FetchError, FetchedPage, Fetcher};

/// Pages larger than this are not worth extracting from.
const MAX_BODY_BYTES: u64 = 5 * 1024 * 1024;

/// Fetches HTML pages with per-domain rate limiting and robots.txt checks.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    rate_limiter: RateLimiter,
    robots: Option<RobotsChecker>,
}

impl HttpFetcher {
    /// Build a fetcher. `user_agent_config` follows [`resolve_user_agent`].
    pub fn new(
        timeout: Duration,
        rate_limiter: RateLimiter,
        user_agent_config: Option<&str>,
        respect_robots: bool,
    ) -> Result<Self, reqwest::Error> {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        let robots = respect_robots.then(|| RobotsChecker::new(client.clone(), ROBOTS_AGENT));

        Ok(Self {
            client,
            rate_limiter,
            robots,
        })
    }

    /// The underlying client, shared with collaborators that need raw HTTP.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

/// Map a transport error to a retry class.
fn classify_transport(err: &reqwest::Error) -> FetchError {
    if err.is_builder() || err.is_redirect() {
        FetchError::permanent(err.to_string())
    } else if err.is_timeout() {
        FetchError::transient(format!("timeout: {}", err))
    } else {
        FetchError::transient(err.to_string())
    }
}

fn is_html(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime == "text/html" || mime == "application/xhtml+xml" || mime == "text/plain"
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed =
            url::Url::parse(url).map_err(|e| FetchError::permanent(format!("bad URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::permanent(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        if let Some(robots) = &self.robots {
            if !robots.is_allowed(url).await {
                return Err(FetchError::permanent("blocked by robots.txt"));
            }
        }

        let domain = self.rate_limiter.acquire(url).await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status().as_u16();
        if let Some(domain) = &domain {
            self.rate_limiter.report_status(domain, status).await;
        }

        if !response.status().is_success() {
            debug!("{} returned HTTP {}", url, status);
            return Err(FetchError::from_status(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !is_html(&content_type) {
            return Err(FetchError::permanent(format!(
                "not an HTML page: {}",
                content_type
            )));
        }
        if response.content_length().unwrap_or(0) > MAX_BODY_BYTES {
            return Err(FetchError::permanent("page too large"));
        }

        let final_url = response.url().to_string();
        let html = response.text().await.map_err(|e| classify_transport(&e))?;

        Ok(FetchedPage {
            url: final_url,
            html,
            status_code: status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html; charset=utf-8"));
        assert!(is_html("application/xhtml+xml"));
        assert!(is_html(""));
        assert!(!is_html("application/pdf"));
        assert!(!is_html("image/jpeg"));
    }

    #[tokio::test]
    async fn test_rejects_non_http_urls() {
        let fetcher =
            HttpFetcher::new(Duration::from_secs(5), RateLimiter::new(), None, false).unwrap();
        let err = fetcher.fetch("mailto:a@ranch.com").await.unwrap_err();
        assert!(!err.is_transient());
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(!err.is_transient());
    }
}
