//! Operator resets and stale-claim recovery.

use std::time::Duration;

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::{info, warn};

use super::FrontierRepository;
use crate::models::UrlStatus;
use crate::repository::pool::DieselError;
use crate::repository::util::{format_timestamp, now_timestamp, retry_on_conflict};
use crate::schema::crawl_urls;
use crate::with_conn;

/// Bounds for stale-claim recovery.
#[derive(Debug, Clone, Copy)]
pub struct ReclaimPolicy {
    /// A `processing` row claimed longer ago than this is stale.
    pub older_than: Duration,
    /// Rows moved per call.
    pub max_rows: u32,
    /// Times one URL may be reclaimed before it is failed.
    pub max_reclaims: u32,
}

impl Default for ReclaimPolicy {
    fn default() -> Self {
        Self {
            older_than: Duration::from_secs(15 * 60),
            max_rows: 500,
            max_reclaims: 3,
        }
    }
}

/// Rows moved by one reclaim pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimOutcome {
    /// Returned to `pending`.
    pub released: u64,
    /// Failed for exceeding `max_reclaims`.
    pub abandoned: u64,
}

impl ReclaimOutcome {
    pub fn total(&self) -> u64 {
        self.released + self.abandoned
    }
}

impl std::ops::AddAssign for ReclaimOutcome {
    fn add_assign(&mut self, other: Self) {
        self.released += other.released;
        self.abandoned += other.abandoned;
    }
}

impl FrontierRepository {
    /// Move `failed` URLs back to `pending` and clear their error.
    ///
    /// With a limit, the oldest failures go first.
    pub async fn reset_failed(&self, limit: Option<u32>) -> Result<u64, DieselError> {
        let ids: Vec<i32> = with_conn!(self.pool, conn => {
            let mut query = crawl_urls::table
                .filter(crawl_urls::status.eq(UrlStatus::Failed.as_str()))
                .order((crawl_urls::processed_at.asc(), crawl_urls::id.asc()))
                .select(crawl_urls::id)
                .into_boxed();
            if let Some(limit) = limit {
                query = query.limit(limit as i64);
            }
            query.load(&mut conn).await?
        });

        if ids.is_empty() {
            return Ok(0);
        }

        let reset = retry_on_conflict("reset_failed", || self.reset_rows(&ids)).await?;
        info!("Reset {} failed URLs to pending", reset);
        Ok(reset)
    }

    /// Recover `processing` rows whose claim is older than `policy.older_than`.
    ///
    /// At most `policy.max_rows` rows move per call, oldest claims first. Rows
    /// with no claim stamp are treated as stale. A row that has already been
    /// reclaimed `policy.max_reclaims` times is failed instead of returned to
    /// `pending`, so a URL that keeps stalling its worker cannot cycle forever.
    pub async fn reclaim_stale(&self, policy: &ReclaimPolicy) -> Result<ReclaimOutcome, DieselError> {
        if policy.max_rows == 0 {
            return Ok(ReclaimOutcome::default());
        }
        let age = chrono::Duration::from_std(policy.older_than).unwrap_or(chrono::Duration::zero());
        let cutoff = format_timestamp(Utc::now() - age);

        let ids: Vec<i32> = with_conn!(self.pool, conn => {
            crawl_urls::table
                .filter(crawl_urls::status.eq(UrlStatus::Processing.as_str()))
                .filter(
                    crawl_urls::claimed_at
                        .lt(&cutoff)
                        .or(crawl_urls::claimed_at.is_null()),
                )
                .order((crawl_urls::claimed_at.asc(), crawl_urls::id.asc()))
                .select(crawl_urls::id)
                .limit(policy.max_rows as i64)
                .load(&mut conn)
                .await?
        });

        if ids.is_empty() {
            return Ok(ReclaimOutcome::default());
        }

        let max_reclaims = policy.max_reclaims as i32;
        let abandoned = retry_on_conflict("abandon_stale", || {
            self.abandon_claims(&ids, &cutoff, max_reclaims)
        })
        .await?;
        let released = retry_on_conflict("reclaim_stale", || {
            self.release_claims(&ids, &cutoff)
        })
        .await?;

        if abandoned > 0 {
            warn!(
                "Failed {} URLs after {} stale claims each",
                abandoned, policy.max_reclaims
            );
        }
        if released > 0 {
            info!("Reclaimed {} stale processing URLs", released);
        }
        Ok(ReclaimOutcome { released, abandoned })
    }

    async fn reset_rows(&self, ids: &[i32]) -> Result<u64, DieselError> {
        with_conn!(self.pool, conn => {
            diesel::update(
                crawl_urls::table
                    .filter(crawl_urls::id.eq_any(ids))
                    .filter(crawl_urls::status.eq(UrlStatus::Failed.as_str())),
            )
            .set((
                crawl_urls::status.eq(UrlStatus::Pending.as_str()),
                crawl_urls::error.eq(None::<String>),
                crawl_urls::processed_at.eq(None::<String>),
            ))
            .execute(&mut conn)
            .await
            .map(|rows| rows as u64)
        })
    }

    /// Fail stale rows that have used up their reclaims.
    async fn abandon_claims(&self, ids: &[i32], cutoff: &str, max_reclaims: i32) -> Result<u64, DieselError> {
        let error = format!("abandoned after {} stale claims", max_reclaims);
        let now = now_timestamp();
        with_conn!(self.pool, conn => {
            diesel::update(
                crawl_urls::table
                    .filter(crawl_urls::id.eq_any(ids))
                    .filter(crawl_urls::status.eq(UrlStatus::Processing.as_str()))
                    .filter(crawl_urls::reclaims.ge(max_reclaims))
                    .filter(
                        crawl_urls::claimed_at
                            .lt(cutoff)
                            .or(crawl_urls::claimed_at.is_null()),
                    ),
            )
            .set((
                crawl_urls::status.eq(UrlStatus::Failed.as_str()),
                crawl_urls::error.eq(Some(&error)),
                crawl_urls::processed_at.eq(Some(&now)),
                crawl_urls::claimed_by.eq(None::<String>),
                crawl_urls::claimed_at.eq(None::<String>),
            ))
            .execute(&mut conn)
            .await
            .map(|rows| rows as u64)
        })
    }

    /// The claim cutoff is re-checked in the update so a row completed or
    /// re-claimed in the meantime is left alone.
    async fn release_claims(&self, ids: &[i32], cutoff: &str) -> Result<u64, DieselError> {
        with_conn!(self.pool, conn => {
            diesel::update(
                crawl_urls::table
                    .filter(crawl_urls::id.eq_any(ids))
                    .filter(crawl_urls::status.eq(UrlStatus::Processing.as_str()))
                    .filter(
                        crawl_urls::claimed_at
                            .lt(cutoff)
                            .or(crawl_urls::claimed_at.is_null()),
                    ),
            )
            .set((
                crawl_urls::status.eq(UrlStatus::Pending.as_str()),
                crawl_urls::claimed_by.eq(None::<String>),
                crawl_urls::claimed_at.eq(None::<String>),
                crawl_urls::reclaims.eq(crawl_urls::reclaims + 1),
            ))
            .execute(&mut conn)
            .await
            .map(|rows| rows as u64)
        })
    }
}
