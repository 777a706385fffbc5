//! Processing of one claimed URL: fetch, extract, store, enqueue.

use std::sync::Arc;

use tracing::{debug, warn};

use super::types::{UrlOutcome, WorkerConfig};
use crate::discovery::validate_state;
use crate::extract::{is_junk_source, Extraction, Extractor};
use crate::models::{CrawlUrl, NewUrl};
use crate::repository::{ContactError, DbContext, DieselError};
use crate::scrapers::{FetchError, FetchedPage, Fetcher};

/// `discovered_by` for URLs found while crawling rather than seeded.
pub const CRAWLER_TAG: &str = "crawler";

pub struct UrlProcessor {
    ctx: DbContext,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    config: WorkerConfig,
}

impl UrlProcessor {
    pub fn new(
        ctx: DbContext,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            ctx,
            fetcher,
            extractor,
            config,
        }
    }

    /// Drive a claimed URL to a terminal state.
    ///
    /// Only storage errors are returned; the URL then stays `processing`
    /// until stale-claim recovery hands it out again, or fails it once it has
    /// stalled too often.
    pub async fn process(&self, url: &CrawlUrl) -> Result<UrlOutcome, DieselError> {
        let existing = self.ctx.contacts().count_by_source_url(&url.url).await?;
        if existing > 0 {
            debug!("{} already has {} contacts, skipping fetch", url.url, existing);
            let emails = existing as u32;
            self.ctx.frontier().complete(url.id, emails).await?;
            self.count_for_job(url, emails).await?;
            return Ok(UrlOutcome::Skipped { emails });
        }

        let page = match self.fetch_with_retries(url).await? {
            Ok(page) => page,
            Err(e) => return self.fail(url, &e.to_string()).await,
        };

        let extraction = match self.extract(page, &url.url).await {
            Ok(extraction) => extraction,
            Err(error) => return self.fail(url, &error).await,
        };

        let emails = self.store_contacts(url, &extraction).await?;
        let discovered = self.enqueue_links(url, &extraction, emails).await?;

        self.ctx.frontier().complete(url.id, emails).await?;
        self.count_for_job(url, emails).await?;

        debug!(
            "{}: {} emails, {} new URLs",
            url.url, emails, discovered
        );
        Ok(UrlOutcome::Completed { emails, discovered })
    }

    /// Fetch under a timeout, retrying transient failures with backoff.
    async fn fetch_with_retries(
        &self,
        url: &CrawlUrl,
    ) -> Result<Result<FetchedPage, FetchError>, DieselError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        let result = loop {
            attempt += 1;
            let error =
                match tokio::time::timeout(self.config.fetch_timeout, self.fetcher.fetch(&url.url))
                    .await
                {
                    Ok(Ok(page)) => break Ok(page),
                    Ok(Err(e)) if !e.is_transient() => break Err(e),
                    Ok(Err(e)) => e,
                    Err(_) => FetchError::transient(format!(
                        "timed out after {}s",
                        self.config.fetch_timeout.as_secs()
                    )),
                };

            if attempt >= max_attempts {
                break Err(FetchError::transient(format!(
                    "{} (after {} attempts)",
                    error, attempt
                )));
            }

            let delay = self.config.backoff(attempt);
            debug!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempt, max_attempts, url.url, error, delay
            );
            tokio::time::sleep(delay).await;
        };

        self.ctx.frontier().record_attempts(url.id, attempt).await?;
        Ok(result)
    }

    /// Run the extractor on a blocking thread.
    async fn extract(&self, page: FetchedPage, source_url: &str) -> Result<Extraction, String> {
        let extractor = self.extractor.clone();
        let source_url = source_url.to_string();
        let html = page.html;

        match tokio::task::spawn_blocking(move || extractor.extract(&html, &source_url)).await {
            Ok(Ok(extraction)) => Ok(extraction),
            Ok(Err(e)) => Err(format!("extraction failed: {}", e)),
            Err(e) => Err(format!("extractor panicked: {}", e)),
        }
    }

    /// Upsert every extracted contact. Returns how many were stored.
    async fn store_contacts(
        &self,
        url: &CrawlUrl,
        extraction: &Extraction,
    ) -> Result<u32, DieselError> {
        let contacts = self.ctx.contacts();
        let mut stored = 0;

        for contact in &extraction.contacts {
            let mut record = contact.clone();
            record.country = url.country.clone();
            record.state = validate_state(&url.country, &record.state);
            if record.state.is_empty() {
                if let Some(target) = &url.state_target {
                    record.state = target.clone();
                }
            }
            if record.source_url.is_empty() {
                record.source_url = url.url.clone();
            }

            match contacts.upsert(&record).await {
                Ok(_) => stored += 1,
                Err(ContactError::InvalidEmail(email)) => {
                    debug!("Dropping invalid email '{}' from {}", email, url.url);
                }
                Err(ContactError::Storage(e)) => return Err(e),
            }
        }
        Ok(stored)
    }

    /// Enqueue links worth following from this page.
    ///
    /// Seeded listing pages contribute their candidate links. Other pages
    /// contribute contact pages, and only when they had no email themselves.
    async fn enqueue_links(
        &self,
        url: &CrawlUrl,
        extraction: &Extraction,
        emails: u32,
    ) -> Result<usize, DieselError> {
        let is_seed_listing = url.source.is_listing() && url.discovered_by != CRAWLER_TAG;
        let links = if is_seed_listing {
            &extraction.discovered_urls
        } else if emails == 0 {
            &extraction.contact_links
        } else {
            return Ok(0);
        };

        let new_urls: Vec<NewUrl> = links
            .iter()
            .filter(|link| !is_junk_source(link))
            .map(|link| {
                NewUrl::new(link.clone(), url.source, CRAWLER_TAG)
                    .with_country(url.country.clone())
                    .with_state(url.state_target.clone())
                    .with_job(url.job_id.clone())
            })
            .collect();
        if new_urls.is_empty() {
            return Ok(0);
        }

        let inserted = self.ctx.frontier().enqueue_many(&new_urls).await?;
        if let Some(job_id) = &url.job_id {
            self.ctx.jobs().add_discovered(job_id, inserted as u32).await?;
        }
        Ok(inserted)
    }

    async fn fail(&self, url: &CrawlUrl, error: &str) -> Result<UrlOutcome, DieselError> {
        warn!("Failed {}: {}", url.url, error);
        self.ctx.frontier().fail(url.id, error).await?;
        self.count_for_job(url, 0).await?;
        Ok(UrlOutcome::Failed {
            error: error.to_string(),
        })
    }

    async fn count_for_job(&self, url: &CrawlUrl, emails: u32) -> Result<(), DieselError> {
        match &url.job_id {
            Some(job_id) => self.ctx.jobs().record_url_processed(job_id, emails).await,
            None => Ok(()),
        }
    }
}
