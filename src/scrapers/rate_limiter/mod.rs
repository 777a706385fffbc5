//! Adaptive per-domain rate limiter.
//!
//! Spaces requests to the same host by a per-domain delay. Backs off on
//! 429/503, gradually recovers on success.

mod domain_state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use domain_state::DomainState;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Delay between requests to one domain.
    pub base_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub recovery_multiplier: f64,
    /// Successes needed before the delay shrinks again.
    pub recovery_threshold: u32,
    /// Hosts with their own base delay (search engines, directories).
    pub domain_delays: HashMap<String, Duration>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let domain_delays = [
            ("duckduckgo.com", 1.0),
            ("html.duckduckgo.com", 1.0),
            ("www.yellowpages.com", 3.0),
            ("www.yellowpages.ca", 3.0),
            ("www.yellowpages.com.au", 3.0),
            ("www.yell.com", 3.0),
            ("yellow.co.nz", 3.0),
            ("www.yelp.com", 3.0),
            ("www.manta.com", 3.0),
        ]
        .into_iter()
        .map(|(host, secs)| (host.to_string(), Duration::from_secs_f64(secs)))
        .collect();

        Self {
            base_delay: Duration::from_secs(2),
            min_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(120),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.8,
            recovery_threshold: 5,
            domain_delays,
        }
    }
}

impl RateLimitConfig {
    fn delay_for(&self, domain: &str) -> Duration {
        self.domain_delays
            .get(domain)
            .copied()
            .unwrap_or(self.base_delay)
    }
}

/// Snapshot of one domain's limiter state.
#[derive(Debug, Clone)]
pub struct DomainStats {
    pub current_delay: Duration,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

/// Shared limiter; clones see the same domain table.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: Arc<RateLimitConfig>,
    domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config: Arc::new(config),
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_ascii_lowercase()))
    }

    /// Wait for this domain's next free slot. Returns the domain, or `None`
    /// for URLs without a host (which are not limited).
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = Self::extract_domain(url)?;

        let wait = {
            let mut domains = self.domains.write().await;
            let base = self.config.delay_for(&domain);
            domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(base))
                .reserve(Instant::now())
        };

        if !wait.is_zero() {
            debug!("Rate limiting {}: waiting {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }

        Some(domain)
    }

    pub async fn report_success(&self, domain: &str) {
        let base = self.config.delay_for(domain);
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.consecutive_successes += 1;

            if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
                let reduced = state.current_delay.mul_f64(self.config.recovery_multiplier);
                state.current_delay = reduced.max(self.config.min_delay);

                if state.current_delay <= base {
                    state.in_backoff = false;
                    state.current_delay = base;
                    info!("Domain {} recovered from rate limit backoff", domain);
                } else {
                    debug!("Domain {} delay reduced to {:?}", domain, state.current_delay);
                }
                state.consecutive_successes = 0;
            }
        }
    }

    /// A 429 or 503: back off multiplicatively.
    pub async fn report_rate_limit(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.rate_limit_hits += 1;
            state.consecutive_successes = 0;
            state.in_backoff = true;
            state.current_delay = state
                .current_delay
                .mul_f64(self.config.backoff_multiplier)
                .min(self.config.max_delay);

            warn!(
                "Rate limited by {} (HTTP {}), backing off to {:?}",
                domain, status_code, state.current_delay
            );
        }
    }

    /// Other 5xx: mild backoff, the host may be overloaded.
    pub async fn report_server_error(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.consecutive_successes = 0;
            state.current_delay = state.current_delay.mul_f64(1.5).min(self.config.max_delay);
            debug!(
                "Server error for {}, delay increased to {:?}",
                domain, state.current_delay
            );
        }
    }

    /// Route a response status to the matching report.
    pub async fn report_status(&self, domain: &str, status_code: u16) {
        match status_code {
            429 | 503 => self.report_rate_limit(domain, status_code).await,
            500..=599 => self.report_server_error(domain).await,
            200..=399 => self.report_success(domain).await,
            _ => {}
        }
    }

    pub async fn time_until_ready(&self, url: &str) -> Duration {
        let Some(domain) = Self::extract_domain(url) else {
            return Duration::ZERO;
        };
        let domains = self.domains.read().await;
        domains
            .get(&domain)
            .map(|s| s.time_until_ready(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    pub async fn get_stats(&self) -> HashMap<String, DomainStats> {
        let domains = self.domains.read().await;
        domains
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    DomainStats {
                        current_delay: v.current_delay,
                        in_backoff: v.in_backoff,
                        total_requests: v.total_requests,
                        rate_limit_hits: v.rate_limit_hits,
                    },
                )
            })
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> RateLimitConfig {
        RateLimitConfig {
            base_delay: Duration::from_millis(100),
            min_delay: Duration::from_millis(10),
            recovery_threshold: 2,
            domain_delays: HashMap::new(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            RateLimiter::extract_domain("https://Ranch.example.com/path"),
            Some("ranch.example.com".to_string())
        );
        assert_eq!(RateLimiter::extract_domain("not a url"), None);
    }

    #[tokio::test]
    async fn test_backoff_and_recovery() {
        let limiter = RateLimiter::with_config(fast_config());
        limiter.acquire("https://example.com/1").await;

        limiter.report_status("example.com", 429).await;
        let stats = limiter.get_stats().await;
        let domain = &stats["example.com"];
        assert_eq!(domain.current_delay, Duration::from_millis(200));
        assert!(domain.in_backoff);
        assert_eq!(domain.rate_limit_hits, 1);

        for _ in 0..8 {
            limiter.report_success("example.com").await;
        }
        let stats = limiter.get_stats().await;
        assert!(!stats["example.com"].in_backoff);
        assert_eq!(stats["example.com"].current_delay, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_concurrent_acquires_are_spaced() {
        let limiter = RateLimiter::with_config(fast_config());
        let start = std::time::Instant::now();

        let a = limiter.clone();
        let b = limiter.clone();
        let (_, _) = tokio::join!(
            a.acquire("https://example.com/a"),
            b.acquire("https://example.com/b")
        );

        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(limiter.time_until_ready("https://example.com/c").await > Duration::ZERO);
    }

    #[test]
    fn test_domain_override() {
        let config = RateLimitConfig::default();
        assert_eq!(config.delay_for("html.duckduckgo.com"), Duration::from_secs(1));
        assert_eq!(config.delay_for("ranch.example"), Duration::from_secs(2));
    }
}
