//! Data models for the crawl store.

mod contact;
mod crawl_url;
mod job;

pub use contact::{normalize_email, Contact, ContactRecord, UpsertOutcome, CSV_FIELDS};
pub use crawl_url::{
    normalize_url, registrable_host, CrawlUrl, EnqueueOutcome, NewUrl, UrlSource, UrlStatus,
};
pub use job::{JobSeed, JobStatus, JobType, ScrapeJob, SearchQuery};
