//! Read-only rollups for the dashboard and `stats` command.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use super::pool::{DbPool, DieselError};
use super::util::format_timestamp;
use super::{parse_datetime, JobRepository, SearchQueryRepository};
use crate::models::UrlStatus;
use crate::repository::FrontierRepository;
use crate::schema::{contacts, crawl_urls};
use crate::with_conn;

/// Headline numbers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardStats {
    pub total_contacts: u64,
    pub total_urls: u64,
    pub urls_by_status: BTreeMap<String, u64>,
    pub jobs_by_status: BTreeMap<String, u64>,
    pub queries_executed: u64,
    pub contacts_last_hour: u64,
    /// URLs that reached a terminal state in the last hour.
    pub urls_processed_last_hour: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryStateCount {
    pub country: String,
    pub state: String,
    pub count: u64,
}

/// New contacts in one hour bucket, keyed by the bucket start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyCount {
    pub hour: DateTime<Utc>,
    pub count: u64,
}

#[derive(Clone)]
pub struct MetricsRepository {
    pool: DbPool,
}

impl MetricsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn dashboard(&self) -> Result<DashboardStats, DieselError> {
        let frontier = FrontierRepository::new(self.pool.clone());
        let jobs = JobRepository::new(self.pool.clone());
        let queries = SearchQueryRepository::new(self.pool.clone());

        let urls_by_status = frontier.count_by_status().await?;
        let jobs_by_status = jobs.count_by_status().await?;

        let hour_ago = format_timestamp(Utc::now() - TimeDelta::hours(1));
        let terminal = [UrlStatus::Completed.as_str(), UrlStatus::Failed.as_str()];

        let (total_contacts, contacts_last_hour): (i64, i64) = with_conn!(self.pool, conn => {
            let total = contacts::table
                .select(count_star())
                .first::<i64>(&mut conn)
                .await?;
            let recent = contacts::table
                .filter(contacts::created_at.ge(&hour_ago))
                .select(count_star())
                .first::<i64>(&mut conn)
                .await?;
            (total, recent)
        });

        let urls_processed_last_hour: i64 = with_conn!(self.pool, conn => {
            crawl_urls::table
                .filter(crawl_urls::status.eq_any(terminal))
                .filter(crawl_urls::processed_at.ge(&hour_ago))
                .select(count_star())
                .first(&mut conn)
                .await?
        });

        Ok(DashboardStats {
            total_contacts: total_contacts as u64,
            total_urls: urls_by_status.values().sum(),
            urls_by_status: urls_by_status
                .into_iter()
                .map(|(status, count)| (status.as_str().to_string(), count))
                .collect(),
            jobs_by_status: jobs_by_status
                .into_iter()
                .map(|(status, count)| (status.as_str().to_string(), count))
                .collect(),
            queries_executed: queries.count().await?,
            contacts_last_hour: contacts_last_hour as u64,
            urls_processed_last_hour: urls_processed_last_hour as u64,
        })
    }

    /// Contacts per state, largest first. Contacts with no state are left out.
    pub async fn emails_per_state(&self) -> Result<Vec<LabelCount>, DieselError> {
        let rows: Vec<(String, i64)> = with_conn!(self.pool, conn => {
            contacts::table
                .filter(contacts::state.ne(""))
                .group_by(contacts::state)
                .select((contacts::state, count_star()))
                .load(&mut conn)
                .await?
        });
        Ok(sorted_counts(rows))
    }

    /// Contacts per country code, largest first.
    pub async fn emails_per_country(&self) -> Result<Vec<LabelCount>, DieselError> {
        let rows: Vec<(String, i64)> = with_conn!(self.pool, conn => {
            contacts::table
                .group_by(contacts::country)
                .select((contacts::country, count_star()))
                .load(&mut conn)
                .await?
        });
        Ok(sorted_counts(rows))
    }

    /// Contacts per (country, state) pair.
    pub async fn emails_by_country_and_state(&self) -> Result<Vec<CountryStateCount>, DieselError> {
        let rows: Vec<(String, String, i64)> = with_conn!(self.pool, conn => {
            contacts::table
                .group_by((contacts::country, contacts::state))
                .select((contacts::country, contacts::state, count_star()))
                .load(&mut conn)
                .await?
        });
        let mut counts: Vec<CountryStateCount> = rows
            .into_iter()
            .map(|(country, state, count)| CountryStateCount {
                country,
                state,
                count: count as u64,
            })
            .collect();
        counts.sort_by(|a, b| {
            a.country
                .cmp(&b.country)
                .then(b.count.cmp(&a.count))
                .then(a.state.cmp(&b.state))
        });
        Ok(counts)
    }

    /// New contacts per hour over the trailing `window`, oldest bucket first.
    /// Hours with no contacts are included with a zero count.
    pub async fn hourly(&self, window: Duration) -> Result<Vec<HourlyCount>, DieselError> {
        let now = Utc::now();
        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::hours(24));
        let start = floor_hour(now - window);
        let since = format_timestamp(start);

        let stamps: Vec<String> = with_conn!(self.pool, conn => {
            contacts::table
                .filter(contacts::created_at.ge(&since))
                .select(contacts::created_at)
                .load(&mut conn)
                .await?
        });

        let mut buckets: BTreeMap<DateTime<Utc>, u64> = BTreeMap::new();
        let mut hour = start;
        while hour <= now {
            buckets.insert(hour, 0);
            hour += TimeDelta::hours(1);
        }
        for stamp in stamps {
            let bucket = floor_hour(parse_datetime(&stamp));
            *buckets.entry(bucket).or_insert(0) += 1;
        }

        Ok(buckets
            .into_iter()
            .map(|(hour, count)| HourlyCount { hour, count })
            .collect())
    }
}

fn floor_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.duration_trunc(TimeDelta::hours(1)).unwrap_or(dt)
}

fn sorted_counts(rows: Vec<(String, i64)>) -> Vec<LabelCount> {
    let mut counts: Vec<LabelCount> = rows
        .into_iter()
        .map(|(label, count)| LabelCount {
            label,
            count: count as u64,
        })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then(a.label.cmp(&b.label)));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContactRecord, JobType, NewUrl, UrlSource};
    use crate::repository::test_support::setup_test_db;

    fn contact(email: &str, country: &str, state: &str) -> ContactRecord {
        ContactRecord {
            country: country.to_string(),
            state: state.to_string(),
            ..ContactRecord::new(email)
        }
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let (ctx, _dir) = setup_test_db().await;
        let frontier = ctx.frontier();
        for url in ["https://a.example", "https://b.example", "https://c.example"] {
            frontier
                .enqueue(&NewUrl::new(url, UrlSource::Search, "q"))
                .await
                .unwrap();
        }
        let claimed = frontier.claim_next(1, "w0").await.unwrap();
        frontier.complete(claimed[0].id, 1).await.unwrap();
        ctx.contacts()
            .upsert(&contact("a@ranch.com", "US", "Texas"))
            .await
            .unwrap();
        ctx.jobs().create(JobType::Search, "US", &[], &[]).await.unwrap();
        ctx.search_queries().record("q", 1, 1, None).await.unwrap();

        let stats = ctx.metrics().dashboard().await.unwrap();
        assert_eq!(stats.total_contacts, 1);
        assert_eq!(stats.total_urls, 3);
        assert_eq!(stats.urls_by_status["pending"], 2);
        assert_eq!(stats.urls_by_status["completed"], 1);
        assert_eq!(stats.jobs_by_status["queued"], 1);
        assert_eq!(stats.queries_executed, 1);
        assert_eq!(stats.contacts_last_hour, 1);
        assert_eq!(stats.urls_processed_last_hour, 1);
    }

    #[tokio::test]
    async fn test_rollups() {
        let (ctx, _dir) = setup_test_db().await;
        let contacts = ctx.contacts();
        contacts.upsert(&contact("a@x.com", "US", "Texas")).await.unwrap();
        contacts.upsert(&contact("b@x.com", "US", "Texas")).await.unwrap();
        contacts.upsert(&contact("c@x.com", "US", "Iowa")).await.unwrap();
        contacts.upsert(&contact("d@x.com", "NZ", "")).await.unwrap();

        let metrics = ctx.metrics();
        let states = metrics.emails_per_state().await.unwrap();
        assert_eq!(
            states,
            vec![
                LabelCount { label: "Texas".into(), count: 2 },
                LabelCount { label: "Iowa".into(), count: 1 },
            ]
        );

        let countries = metrics.emails_per_country().await.unwrap();
        assert_eq!(countries[0], LabelCount { label: "US".into(), count: 3 });

        let pairs = metrics.emails_by_country_and_state().await.unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].country, "NZ");

        let hourly = metrics.hourly(Duration::from_secs(6 * 3600)).await.unwrap();
        assert!(hourly.len() >= 6);
        assert_eq!(hourly.iter().map(|h| h.count).sum::<u64>(), 4);
    }
}
