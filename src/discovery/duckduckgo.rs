//! DuckDuckGo search engine query source.
//!
//! Uses the HTML endpoint, which needs no API key.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::debug;

use super::{DiscoveryError, QuerySource};
use crate::scrapers::RateLimiter;

/// DuckDuckGo search URL.
const DDG_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";

/// No region bias; queries already name the country and region.
const DDG_REGION: &str = "wt-wt";

pub struct DuckDuckGoSource {
    client: Client,
    rate_limiter: RateLimiter,
    max_results: usize,
}

impl DuckDuckGoSource {
    pub fn new(client: Client, rate_limiter: RateLimiter, max_results: usize) -> Self {
        Self {
            client,
            rate_limiter,
            max_results,
        }
    }

    /// Parse result links from a results page, decoded, deduplicated and
    /// capped at `max_results`.
    pub fn parse_results(&self, html: &str) -> Result<Vec<String>, DiscoveryError> {
        let document = Html::parse_document(html);

        // DuckDuckGo HTML results are in <a class="result__a"> elements
        let result_selector = Selector::parse("a.result__a")
            .map_err(|e| DiscoveryError::Parse(format!("Failed to parse selector: {:?}", e)))?;

        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for element in document.select(&result_selector) {
            let Some(url) = element.value().attr("href").and_then(extract_url) else {
                continue;
            };
            if seen.insert(url.clone()) {
                urls.push(url);
                if urls.len() >= self.max_results {
                    break;
                }
            }
        }

        debug!("Parsed {} results from DuckDuckGo", urls.len());
        Ok(urls)
    }
}

/// Extract the actual URL from DuckDuckGo's redirect URL.
pub fn extract_url(href: &str) -> Option<String> {
    let href = href.trim();
    if href.contains("duckduckgo.com/l/") {
        // Redirect form: //duckduckgo.com/l/?uddg=<encoded_url>&rut=...
        let start = href.find("uddg=")? + "uddg=".len();
        let encoded = &href[start..];
        let end = encoded.find('&').unwrap_or(encoded.len());
        urlencoding::decode(&encoded[..end])
            .ok()
            .map(|s| s.into_owned())
            .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
    } else if href.starts_with("http://") || href.starts_with("https://") {
        Some(href.to_string())
    } else if let Some(rest) = href.strip_prefix("//") {
        Some(format!("https://{}", rest))
    } else {
        None
    }
}

#[async_trait]
impl QuerySource for DuckDuckGoSource {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str) -> Result<Vec<String>, DiscoveryError> {
        debug!("DuckDuckGo search: {}", query);

        let domain = self.rate_limiter.acquire(DDG_SEARCH_URL).await;
        let response = self
            .client
            .post(DDG_SEARCH_URL)
            .form(&[("q", query), ("kl", DDG_REGION)])
            .send()
            .await?;

        let status = response.status();
        if let Some(domain) = &domain {
            self.rate_limiter.report_status(domain, status.as_u16()).await;
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            return Err(DiscoveryError::RateLimited(format!(
                "DuckDuckGo returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(DiscoveryError::Unavailable(format!(
                "DuckDuckGo returned {}",
                status
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| DiscoveryError::Parse(format!("Failed to read response text: {}", e)))?;
        self.parse_results(&html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(max_results: usize) -> DuckDuckGoSource {
        DuckDuckGoSource::new(Client::new(), RateLimiter::new(), max_results)
    }

    #[test]
    fn extract_redirect_url() {
        let url = extract_url(
            "//duckduckgo.com/l/?uddg=https%3A%2F%2Fsmithranch.com%2Fcontact%3Fa%3D1&rut=abc",
        );
        assert_eq!(url, Some("https://smithranch.com/contact?a=1".to_string()));
    }

    #[test]
    fn extract_direct_and_protocol_relative_url() {
        assert_eq!(
            extract_url("https://smithranch.com/"),
            Some("https://smithranch.com/".to_string())
        );
        assert_eq!(
            extract_url("//smithranch.com/about"),
            Some("https://smithranch.com/about".to_string())
        );
        assert_eq!(extract_url("/html/?q=next"), None);
        assert_eq!(extract_url("//duckduckgo.com/l/?rut=abc"), None);
    }

    #[test]
    fn parse_results_dedups_and_caps() {
        let html = r#"<html><body>
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fa-ranch.com%2F&rut=1">A</a>
            <a class="result__a" href="https://a-ranch.com/">A again</a>
            <a class="result__snippet" href="https://snippet.com/">not a result</a>
            <a class="result__a" href="https://b-ranch.com/">B</a>
            <a class="result__a" href="https://c-ranch.com/">C</a>
            </body></html>"#;

        let urls = source(2).parse_results(html).unwrap();
        assert_eq!(
            urls,
            vec!["https://a-ranch.com/".to_string(), "https://b-ranch.com/".to_string()]
        );

        let urls = source(20).parse_results(html).unwrap();
        assert_eq!(urls.len(), 3);
    }
}
