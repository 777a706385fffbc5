//! Insert-if-absent for frontier URLs.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use super::{FrontierError, FrontierRepository};
use crate::models::{normalize_url, EnqueueOutcome, NewUrl, UrlStatus};
use crate::repository::pool::DieselError;
use crate::repository::records::NewCrawlUrlRecord;
use crate::repository::util::{now_timestamp, retry_on_conflict};
use crate::schema::crawl_urls;
use crate::with_conn;

impl FrontierRepository {
    /// Put a URL into the frontier as `pending` unless its normalized form is
    /// already known. Re-enqueueing never touches the existing row.
    pub async fn enqueue(&self, new_url: &NewUrl) -> Result<EnqueueOutcome, FrontierError> {
        let url = normalize_url(&new_url.url)
            .ok_or_else(|| FrontierError::InvalidUrl(new_url.url.clone()))?;

        let inserted =
            retry_on_conflict("enqueue", || self.insert_if_absent(&url, new_url)).await?;

        Ok(if inserted {
            EnqueueOutcome::Inserted
        } else {
            EnqueueOutcome::AlreadyPresent
        })
    }

    /// Enqueue a batch, skipping URLs that fail to normalize.
    ///
    /// Returns how many rows were actually inserted.
    pub async fn enqueue_many(&self, urls: &[NewUrl]) -> Result<usize, DieselError> {
        let mut inserted = 0;
        for new_url in urls {
            match self.enqueue(new_url).await {
                Ok(EnqueueOutcome::Inserted) => inserted += 1,
                Ok(EnqueueOutcome::AlreadyPresent) => {}
                Err(FrontierError::InvalidUrl(url)) => {
                    debug!("Skipping unusable URL: {}", url);
                }
                Err(FrontierError::Storage(e)) => return Err(e),
            }
        }
        Ok(inserted)
    }

    async fn insert_if_absent(&self, url: &str, new_url: &NewUrl) -> Result<bool, DieselError> {
        let now = now_timestamp();
        let record = NewCrawlUrlRecord {
            url,
            status: UrlStatus::Pending.as_str(),
            source: new_url.source.as_str(),
            discovered_by: &new_url.discovered_by,
            state_target: new_url.state_target.as_deref(),
            country: &new_url.country,
            job_id: new_url.job_id.as_deref(),
            emails_found: 0,
            attempts: 0,
            created_at: &now,
        };

        with_conn!(self.pool, conn => {
            diesel::insert_into(crawl_urls::table)
                .values(&record)
                .on_conflict(crawl_urls::url)
                .do_nothing()
                .execute(&mut conn)
                .await
                .map(|rows| rows > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{EnqueueOutcome, NewUrl, UrlSource, UrlStatus};
    use crate::repository::test_support::setup_test_db;
    use crate::repository::FrontierError;

    #[tokio::test]
    async fn test_enqueue_twice_keeps_one_row() {
        let (ctx, _dir) = setup_test_db().await;
        let frontier = ctx.frontier();

        let first = frontier
            .enqueue(&NewUrl::new("https://example-farm.com", UrlSource::Search, "q1"))
            .await
            .unwrap();
        let second = frontier
            .enqueue(&NewUrl::new("https://example-farm.com/", UrlSource::Directory, "q2"))
            .await
            .unwrap();

        assert_eq!(first, EnqueueOutcome::Inserted);
        assert_eq!(second, EnqueueOutcome::AlreadyPresent);
        assert_eq!(frontier.count_all().await.unwrap(), 1);

        let row = frontier
            .get_by_url("https://example-farm.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.source, UrlSource::Search);
        assert_eq!(row.discovered_by, "q1");
    }

    #[tokio::test]
    async fn test_reenqueue_does_not_change_status() {
        let (ctx, _dir) = setup_test_db().await;
        let frontier = ctx.frontier();
        let url = NewUrl::new("https://ranch.example/contact", UrlSource::Search, "q");

        frontier.enqueue(&url).await.unwrap();
        let claimed = frontier.claim_next(1, "w0").await.unwrap();
        frontier.complete(claimed[0].id, 2).await.unwrap();

        let outcome = frontier.enqueue(&url).await.unwrap();
        assert_eq!(outcome, EnqueueOutcome::AlreadyPresent);

        let row = frontier.get(claimed[0].id).await.unwrap().unwrap();
        assert_eq!(row.status, UrlStatus::Completed);
        assert_eq!(row.emails_found, 2);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_url() {
        let (ctx, _dir) = setup_test_db().await;
        let err = ctx
            .frontier()
            .enqueue(&NewUrl::new("javascript:void(0)", UrlSource::Search, "q"))
            .await
            .unwrap_err();
        assert!(matches!(err, FrontierError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_enqueue_many_counts_inserts() {
        let (ctx, _dir) = setup_test_db().await;
        let frontier = ctx.frontier();
        let urls = vec![
            NewUrl::new("https://a.example", UrlSource::Search, "q"),
            NewUrl::new("https://b.example", UrlSource::Search, "q"),
            NewUrl::new("https://a.example/", UrlSource::Search, "q"),
            NewUrl::new("not-a-url", UrlSource::Search, "q"),
        ];
        assert_eq!(frontier.enqueue_many(&urls).await.unwrap(), 2);
        assert_eq!(frontier.count_all().await.unwrap(), 2);
    }
}
