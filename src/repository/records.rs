//! Diesel row types and their conversions to domain models.

use diesel::prelude::*;

use super::{parse_datetime, parse_datetime_opt};
use crate::models::{
    Contact, ContactRecord, CrawlUrl, JobSeed, JobStatus, JobType, ScrapeJob, SearchQuery,
    UrlSource, UrlStatus,
};
use crate::schema::{contacts, crawl_urls, scrape_jobs, search_queries};

/// Frontier row.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crawl_urls)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CrawlUrlRecord {
    pub id: i32,
    pub url: String,
    pub status: String,
    pub source: String,
    pub discovered_by: String,
    pub state_target: Option<String>,
    pub country: String,
    pub job_id: Option<String>,
    pub emails_found: i32,
    pub attempts: i32,
    pub error: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<String>,
    pub created_at: String,
    pub processed_at: Option<String>,
    pub reclaims: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crawl_urls)]
pub struct NewCrawlUrlRecord<'a> {
    pub url: &'a str,
    pub status: &'a str,
    pub source: &'a str,
    pub discovered_by: &'a str,
    pub state_target: Option<&'a str>,
    pub country: &'a str,
    pub job_id: Option<&'a str>,
    pub emails_found: i32,
    pub attempts: i32,
    pub created_at: &'a str,
}

impl From<CrawlUrlRecord> for CrawlUrl {
    fn from(record: CrawlUrlRecord) -> Self {
        Self {
            id: record.id,
            url: record.url,
            status: UrlStatus::from_str(&record.status).unwrap_or(UrlStatus::Pending),
            source: UrlSource::from_str(&record.source).unwrap_or(UrlSource::Manual),
            discovered_by: record.discovered_by,
            state_target: record.state_target,
            country: record.country,
            job_id: record.job_id,
            emails_found: record.emails_found.max(0) as u32,
            attempts: record.attempts.max(0) as u32,
            error: record.error,
            claimed_by: record.claimed_by,
            claimed_at: parse_datetime_opt(record.claimed_at),
            created_at: parse_datetime(&record.created_at),
            processed_at: parse_datetime_opt(record.processed_at),
            reclaims: record.reclaims.max(0) as u32,
        }
    }
}

/// Contact row.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = contacts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ContactRow {
    pub id: i32,
    pub email: String,
    pub farm_name: String,
    pub owner_name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub website: String,
    pub facebook: String,
    pub instagram: String,
    pub cattle_type: String,
    pub breed: String,
    pub head_count: String,
    pub source_url: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = contacts)]
pub struct NewContactRow<'a> {
    pub email: &'a str,
    pub farm_name: &'a str,
    pub owner_name: &'a str,
    pub phone: &'a str,
    pub address: &'a str,
    pub city: &'a str,
    pub state: &'a str,
    pub zip_code: &'a str,
    pub country: &'a str,
    pub website: &'a str,
    pub facebook: &'a str,
    pub instagram: &'a str,
    pub cattle_type: &'a str,
    pub breed: &'a str,
    pub head_count: &'a str,
    pub source_url: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

impl<'a> NewContactRow<'a> {
    /// Borrow a record whose email is already normalized.
    pub fn from_record(email: &'a str, record: &'a ContactRecord, now: &'a str) -> Self {
        Self {
            email,
            farm_name: record.farm_name.trim(),
            owner_name: record.owner_name.trim(),
            phone: record.phone.trim(),
            address: record.address.trim(),
            city: record.city.trim(),
            state: record.state.trim(),
            zip_code: record.zip_code.trim(),
            country: record.country.trim(),
            website: record.website.trim(),
            facebook: record.facebook.trim(),
            instagram: record.instagram.trim(),
            cattle_type: record.cattle_type.trim(),
            breed: record.breed.trim(),
            head_count: record.head_count.trim(),
            source_url: record.source_url.trim(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Self {
            id: row.id,
            record: ContactRecord {
                email: row.email,
                farm_name: row.farm_name,
                owner_name: row.owner_name,
                phone: row.phone,
                address: row.address,
                city: row.city,
                state: row.state,
                zip_code: row.zip_code,
                country: row.country,
                website: row.website,
                facebook: row.facebook,
                instagram: row.instagram,
                cattle_type: row.cattle_type,
                breed: row.breed,
                head_count: row.head_count,
                source_url: row.source_url,
            },
            created_at: parse_datetime(&row.created_at),
            updated_at: parse_datetime(&row.updated_at),
        }
    }
}

/// Scrape job row.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = scrape_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ScrapeJobRecord {
    pub id: String,
    pub job_type: String,
    pub country: String,
    pub states: String,
    pub seeds: String,
    pub status: String,
    pub query_index: i32,
    pub total_queries: i32,
    pub urls_discovered: i32,
    pub urls_processed: i32,
    pub emails_found: i32,
    pub cancel_requested: i32,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = scrape_jobs)]
pub struct NewScrapeJobRecord<'a> {
    pub id: &'a str,
    pub job_type: &'a str,
    pub country: &'a str,
    pub states: &'a str,
    pub seeds: &'a str,
    pub status: &'a str,
    pub query_index: i32,
    pub total_queries: i32,
    pub urls_discovered: i32,
    pub urls_processed: i32,
    pub emails_found: i32,
    pub cancel_requested: i32,
    pub created_at: &'a str,
}

impl From<ScrapeJobRecord> for ScrapeJob {
    fn from(record: ScrapeJobRecord) -> Self {
        let states: Vec<String> = serde_json::from_str(&record.states).unwrap_or_default();
        let seeds: Vec<JobSeed> = serde_json::from_str(&record.seeds).unwrap_or_default();

        Self {
            id: record.id,
            job_type: JobType::from_str(&record.job_type).unwrap_or(JobType::Search),
            country: record.country,
            states,
            seeds,
            status: JobStatus::from_str(&record.status).unwrap_or(JobStatus::Failed),
            query_index: record.query_index.max(0) as u32,
            total_queries: record.total_queries.max(0) as u32,
            urls_discovered: record.urls_discovered.max(0) as u32,
            urls_processed: record.urls_processed.max(0) as u32,
            emails_found: record.emails_found.max(0) as u32,
            cancel_requested: record.cancel_requested != 0,
            error: record.error,
            created_at: parse_datetime(&record.created_at),
            started_at: parse_datetime_opt(record.started_at),
            completed_at: parse_datetime_opt(record.completed_at),
        }
    }
}

/// Search query row.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = search_queries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SearchQueryRecord {
    pub id: i32,
    pub query: String,
    pub results_count: i32,
    pub urls_found: i32,
    pub job_id: Option<String>,
    pub executed_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = search_queries)]
pub struct NewSearchQueryRecord<'a> {
    pub query: &'a str,
    pub results_count: i32,
    pub urls_found: i32,
    pub job_id: Option<&'a str>,
    pub executed_at: &'a str,
}

impl From<SearchQueryRecord> for SearchQuery {
    fn from(record: SearchQueryRecord) -> Self {
        Self {
            id: record.id,
            query: record.query,
            results_count: record.results_count.max(0) as u32,
            urls_found: record.urls_found.max(0) as u32,
            job_id: record.job_id,
            executed_at: parse_datetime(&record.executed_at),
        }
    }
}
