//! Frontier counts and lookups.

use std::collections::HashMap;

use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::FrontierRepository;
use crate::models::{normalize_url, CrawlUrl, UrlStatus};
use crate::repository::pool::DieselError;
use crate::repository::records::CrawlUrlRecord;
use crate::schema::crawl_urls;
use crate::with_conn;

impl FrontierRepository {
    /// Total rows in the frontier.
    pub async fn count_all(&self) -> Result<u64, DieselError> {
        with_conn!(self.pool, conn => {
            crawl_urls::table
                .select(count_star())
                .first::<i64>(&mut conn)
                .await
                .map(|c| c as u64)
        })
    }

    /// Count URLs by status. Statuses with no rows are reported as zero.
    pub async fn count_by_status(&self) -> Result<HashMap<UrlStatus, u64>, DieselError> {
        let rows: Vec<(String, i64)> = with_conn!(self.pool, conn => {
            crawl_urls::table
                .group_by(crawl_urls::status)
                .select((crawl_urls::status, count_star()))
                .load(&mut conn)
                .await?
        });

        let mut counts: HashMap<UrlStatus, u64> =
            UrlStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for (status, count) in rows {
            if let Some(status) = UrlStatus::from_str(&status) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }

    pub async fn count_with_status(&self, status: UrlStatus) -> Result<u64, DieselError> {
        with_conn!(self.pool, conn => {
            crawl_urls::table
                .filter(crawl_urls::status.eq(status.as_str()))
                .select(count_star())
                .first::<i64>(&mut conn)
                .await
                .map(|c| c as u64)
        })
    }

    /// Count URLs attributed to a job in any of the given statuses.
    pub async fn count_for_job(
        &self,
        job_id: &str,
        statuses: &[UrlStatus],
    ) -> Result<u64, DieselError> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        with_conn!(self.pool, conn => {
            crawl_urls::table
                .filter(crawl_urls::job_id.eq(job_id))
                .filter(crawl_urls::status.eq_any(&statuses))
                .select(count_star())
                .first::<i64>(&mut conn)
                .await
                .map(|c| c as u64)
        })
    }

    pub async fn get(&self, id: i32) -> Result<Option<CrawlUrl>, DieselError> {
        with_conn!(self.pool, conn => {
            crawl_urls::table
                .find(id)
                .first::<CrawlUrlRecord>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(CrawlUrl::from))
        })
    }

    /// Look up a URL by its normalized form.
    pub async fn get_by_url(&self, url: &str) -> Result<Option<CrawlUrl>, DieselError> {
        let Some(url) = normalize_url(url) else {
            return Ok(None);
        };
        with_conn!(self.pool, conn => {
            crawl_urls::table
                .filter(crawl_urls::url.eq(&url))
                .first::<CrawlUrlRecord>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(CrawlUrl::from))
        })
    }

    /// Most recently created URLs, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<UrlStatus>,
        limit: u32,
    ) -> Result<Vec<CrawlUrl>, DieselError> {
        with_conn!(self.pool, conn => {
            let mut query = crawl_urls::table
                .order((crawl_urls::created_at.desc(), crawl_urls::id.desc()))
                .limit(limit as i64)
                .into_boxed();
            if let Some(status) = status {
                query = query.filter(crawl_urls::status.eq(status.as_str()));
            }
            query
                .load::<CrawlUrlRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(CrawlUrl::from).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{NewUrl, UrlSource, UrlStatus};
    use crate::repository::test_support::setup_test_db;

    #[tokio::test]
    async fn test_counts_by_status_and_job() {
        let (ctx, _dir) = setup_test_db().await;
        let frontier = ctx.frontier();
        let job = Some("job-1".to_string());
        frontier
            .enqueue(&NewUrl::new("https://a.example", UrlSource::Search, "q").with_job(job.clone()))
            .await
            .unwrap();
        frontier
            .enqueue(&NewUrl::new("https://b.example", UrlSource::Search, "q").with_job(job))
            .await
            .unwrap();
        frontier
            .enqueue(&NewUrl::new("https://c.example", UrlSource::Manual, "cli"))
            .await
            .unwrap();

        let claimed = frontier.claim_next(1, "w0").await.unwrap();
        frontier.complete(claimed[0].id, 0).await.unwrap();

        let counts = frontier.count_by_status().await.unwrap();
        assert_eq!(counts[&UrlStatus::Pending], 2);
        assert_eq!(counts[&UrlStatus::Completed], 1);
        assert_eq!(counts[&UrlStatus::Failed], 0);

        let open = frontier
            .count_for_job("job-1", &[UrlStatus::Pending, UrlStatus::Processing])
            .await
            .unwrap();
        assert_eq!(open, 1);
        assert_eq!(
            frontier.count_for_job("other", &[UrlStatus::Pending]).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_get_by_url_normalizes() {
        let (ctx, _dir) = setup_test_db().await;
        let frontier = ctx.frontier();
        frontier
            .enqueue(&NewUrl::new("https://ranch.example/about?utm_source=x", UrlSource::Search, "q"))
            .await
            .unwrap();

        let row = frontier
            .get_by_url("https://ranch.example/about#team")
            .await
            .unwrap();
        assert!(row.is_some());
        assert!(frontier.get_by_url("nope").await.unwrap().is_none());
        assert_eq!(frontier.list(Some(UrlStatus::Pending), 10).await.unwrap().len(), 1);
    }
}
