//! Claiming and terminal transitions.
//!
//! A claim is a conditional update guarded by `status = 'pending'`; the caller
//! owns the row only when exactly one row was affected.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::{debug, warn};

use super::FrontierRepository;
use crate::models::{CrawlUrl, UrlStatus};
use crate::repository::pool::DieselError;
use crate::repository::records::CrawlUrlRecord;
use crate::repository::util::{is_conflict, now_timestamp, retry_on_conflict};
use crate::schema::crawl_urls;
use crate::with_conn;

/// Candidate rounds before a claim gives up on filling the batch.
const CLAIM_ROUNDS: usize = 3;

/// Longest error text kept on a row.
const MAX_ERROR_LEN: usize = 1000;

impl FrontierRepository {
    /// Atomically move up to `limit` pending URLs to `processing`, oldest first.
    ///
    /// Concurrent callers never receive the same URL. An empty frontier yields an
    /// empty vec.
    pub async fn claim_next(&self, limit: u32, claimant: &str) -> Result<Vec<CrawlUrl>, DieselError> {
        let limit = limit as usize;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = now_timestamp();

        let (claimed_ids, failure) = with_conn!(self.pool, conn => {
            let mut claimed: Vec<i32> = Vec::with_capacity(limit);
            let mut failure: Option<DieselError> = None;

            'rounds: for _ in 0..CLAIM_ROUNDS {
                let wanted = limit - claimed.len();
                if wanted == 0 {
                    break;
                }

                let candidates: Vec<i32> = match crawl_urls::table
                    .filter(crawl_urls::status.eq(UrlStatus::Pending.as_str()))
                    .order((crawl_urls::created_at.asc(), crawl_urls::id.asc()))
                    .select(crawl_urls::id)
                    .limit(wanted as i64)
                    .load(&mut conn)
                    .await
                {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                };

                if candidates.is_empty() {
                    break;
                }

                for id in candidates {
                    let result = diesel::update(
                        crawl_urls::table
                            .filter(crawl_urls::id.eq(id))
                            .filter(crawl_urls::status.eq(UrlStatus::Pending.as_str())),
                    )
                    .set((
                        crawl_urls::status.eq(UrlStatus::Processing.as_str()),
                        crawl_urls::claimed_by.eq(claimant),
                        crawl_urls::claimed_at.eq(&now),
                        crawl_urls::attempts.eq(0),
                        crawl_urls::error.eq(None::<String>),
                    ))
                    .execute(&mut conn)
                    .await;

                    match result {
                        Ok(1) => claimed.push(id),
                        Ok(_) => {}
                        // The update did not apply, so the row is still pending for someone else
                        Err(e) if is_conflict(&e) => {
                            debug!("Claim of URL {} lost to a write conflict: {}", id, e);
                        }
                        Err(e) => {
                            failure = Some(e);
                            break 'rounds;
                        }
                    }
                }
            }

            (claimed, failure)
        });

        if let Some(e) = failure {
            if claimed_ids.is_empty() {
                return Err(e);
            }
            // Rows claimed before the error are already ours
            warn!("Claim stopped early after {} URLs: {}", claimed_ids.len(), e);
        }
        if claimed_ids.is_empty() {
            return Ok(Vec::new());
        }

        let loaded: Result<Vec<CrawlUrlRecord>, DieselError> = with_conn!(self.pool, conn => {
            crawl_urls::table
                .filter(crawl_urls::id.eq_any(&claimed_ids))
                .order((crawl_urls::created_at.asc(), crawl_urls::id.asc()))
                .load::<CrawlUrlRecord>(&mut conn)
                .await
        });
        match loaded {
            Ok(records) => Ok(records.into_iter().map(CrawlUrl::from).collect()),
            Err(e) => {
                // Nobody would process these rows, so give them back before failing
                if let Err(release_error) = self.unclaim(&claimed_ids, claimant).await {
                    warn!("Failed to release {} claimed URLs: {}", claimed_ids.len(), release_error);
                }
                Err(e)
            }
        }
    }

    /// Return rows this claimant still holds to `pending`.
    async fn unclaim(&self, ids: &[i32], claimant: &str) -> Result<u64, DieselError> {
        with_conn!(self.pool, conn => {
            diesel::update(
                crawl_urls::table
                    .filter(crawl_urls::id.eq_any(ids))
                    .filter(crawl_urls::status.eq(UrlStatus::Processing.as_str()))
                    .filter(crawl_urls::claimed_by.eq(claimant)),
            )
            .set((
                crawl_urls::status.eq(UrlStatus::Pending.as_str()),
                crawl_urls::claimed_by.eq(None::<String>),
                crawl_urls::claimed_at.eq(None::<String>),
            ))
            .execute(&mut conn)
            .await
            .map(|rows| rows as u64)
        })
    }

    /// Mark a claimed URL completed with its email count.
    ///
    /// Returns false when the row was no longer `processing`, which happens if
    /// stale reclaim took it back while this worker was still busy.
    pub async fn complete(&self, url_id: i32, emails_found: u32) -> Result<bool, DieselError> {
        let changed = retry_on_conflict("complete", || {
            self.finish(url_id, UrlStatus::Completed, emails_found, None)
        })
        .await?;
        if !changed {
            warn!("URL {} was not processing when completed", url_id);
        }
        Ok(changed)
    }

    /// Mark a claimed URL failed. Failure is terminal until an operator resets it.
    pub async fn fail(&self, url_id: i32, error: &str) -> Result<bool, DieselError> {
        let error = truncate_error(error);
        let changed = retry_on_conflict("fail", || {
            self.finish(url_id, UrlStatus::Failed, 0, Some(error.clone()))
        })
        .await?;
        if !changed {
            warn!("URL {} was not processing when failed", url_id);
        }
        Ok(changed)
    }

    /// Persist the fetch attempts spent inside the current claim.
    pub async fn record_attempts(&self, url_id: i32, attempts: u32) -> Result<(), DieselError> {
        with_conn!(self.pool, conn => {
            diesel::update(
                crawl_urls::table
                    .filter(crawl_urls::id.eq(url_id))
                    .filter(crawl_urls::status.eq(UrlStatus::Processing.as_str())),
            )
            .set(crawl_urls::attempts.eq(attempts as i32))
            .execute(&mut conn)
            .await
            .map(|_| ())
        })
    }

    async fn finish(
        &self,
        url_id: i32,
        status: UrlStatus,
        emails_found: u32,
        error: Option<String>,
    ) -> Result<bool, DieselError> {
        let now = now_timestamp();
        with_conn!(self.pool, conn => {
            diesel::update(
                crawl_urls::table
                    .filter(crawl_urls::id.eq(url_id))
                    .filter(crawl_urls::status.eq(UrlStatus::Processing.as_str())),
            )
            .set((
                crawl_urls::status.eq(status.as_str()),
                crawl_urls::emails_found.eq(emails_found as i32),
                crawl_urls::error.eq(&error),
                crawl_urls::processed_at.eq(Some(&now)),
                crawl_urls::claimed_by.eq(None::<String>),
                crawl_urls::claimed_at.eq(None::<String>),
            ))
            .execute(&mut conn)
            .await
            .map(|rows| rows == 1)
        })
    }
}

fn truncate_error(error: &str) -> String {
    if error.len() <= MAX_ERROR_LEN {
        return error.to_string();
    }
    let mut end = MAX_ERROR_LEN;
    while !error.is_char_boundary(end) {
        end -= 1;
    }
    error[..end].to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use diesel_async::SimpleAsyncConnection;

    use crate::models::{NewUrl, UrlSource, UrlStatus};
    use crate::repository::pool::DbPool;
    use crate::repository::test_support::setup_test_db;

    #[tokio::test]
    async fn test_claim_empty_frontier() {
        let (ctx, _dir) = setup_test_db().await;
        let claimed = ctx.frontier().claim_next(10, "w0").await.unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn test_claim_moves_to_processing() {
        let (ctx, _dir) = setup_test_db().await;
        let frontier = ctx.frontier();
        frontier
            .enqueue(&NewUrl::new("https://example-farm.com", UrlSource::Search, "q"))
            .await
            .unwrap();

        let claimed = frontier.claim_next(5, "w0").await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].url, "https://example-farm.com");
        assert_eq!(claimed[0].status, UrlStatus::Processing);
        assert_eq!(claimed[0].claimed_by.as_deref(), Some("w0"));

        // Nothing left to claim
        assert!(frontier.claim_next(5, "w1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_and_fail_are_terminal() {
        let (ctx, _dir) = setup_test_db().await;
        let frontier = ctx.frontier();
        for url in ["https://a.example", "https://b.example"] {
            frontier
                .enqueue(&NewUrl::new(url, UrlSource::Search, "q"))
                .await
                .unwrap();
        }
        let claimed = frontier.claim_next(2, "w0").await.unwrap();
        assert!(frontier.complete(claimed[0].id, 3).await.unwrap());
        assert!(frontier.fail(claimed[1].id, "HTTP 404").await.unwrap());

        // Second transition on a terminal row is refused
        assert!(!frontier.complete(claimed[1].id, 1).await.unwrap());

        let done = frontier.get(claimed[0].id).await.unwrap().unwrap();
        assert_eq!(done.status, UrlStatus::Completed);
        assert_eq!(done.emails_found, 3);
        assert!(done.processed_at.is_some());

        let failed = frontier.get(claimed[1].id).await.unwrap().unwrap();
        assert_eq!(failed.status, UrlStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("HTTP 404"));
        assert!(failed.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_claims_never_overlap() {
        let (ctx, _dir) = setup_test_db().await;
        let frontier = Arc::new(ctx.frontier());

        let urls: Vec<NewUrl> = (0..60)
            .map(|i| NewUrl::new(format!("https://farm{}.example", i), UrlSource::Search, "q"))
            .collect();
        assert_eq!(frontier.enqueue_many(&urls).await.unwrap(), 60);

        let mut handles = Vec::new();
        for worker in 0..8 {
            let frontier = frontier.clone();
            handles.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                loop {
                    let batch = frontier
                        .claim_next(4, &format!("w{}", worker))
                        .await
                        .unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    mine.extend(batch.into_iter().map(|u| u.id));
                }
                mine
            }));
        }

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for id in handle.await.unwrap() {
                total += 1;
                assert!(seen.insert(id), "URL {} claimed twice", id);
            }
        }
        assert_eq!(total, 60);
        assert_eq!(
            frontier.count_with_status(UrlStatus::Processing).await.unwrap(),
            60
        );
    }

    #[tokio::test]
    async fn test_claim_error_keeps_rows_already_claimed() {
        let (ctx, _dir) = setup_test_db().await;
        let frontier = ctx.frontier();
        for url in ["https://a.example", "https://b.example", "https://c.example"] {
            frontier
                .enqueue(&NewUrl::new(url, UrlSource::Search, "q"))
                .await
                .unwrap();
        }

        let DbPool::Sqlite(pool) = ctx.pool() else {
            unreachable!("tests run on SQLite");
        };
        let mut conn = pool.get().await.unwrap();
        conn.batch_execute(
            "CREATE TRIGGER refuse_b BEFORE UPDATE OF status ON crawl_urls \
             WHEN NEW.url = 'https://b.example' AND NEW.status = 'processing' \
             BEGIN SELECT RAISE(ABORT, 'claim refused'); END;",
        )
        .await
        .unwrap();

        let claimed = frontier.claim_next(3, "w0").await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].url, "https://a.example");

        let b = frontier.get_by_url("https://b.example").await.unwrap().unwrap();
        assert_eq!(b.status, UrlStatus::Pending);
        let c = frontier.get_by_url("https://c.example").await.unwrap().unwrap();
        assert_eq!(c.status, UrlStatus::Pending);

        // Failing on the first candidate claims nothing and reports the error
        assert!(frontier.claim_next(3, "w1").await.is_err());
        assert_eq!(frontier.count_with_status(UrlStatus::Processing).await.unwrap(), 1);
    }
}
