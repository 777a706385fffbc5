//! Scrape job persistence.
//!
//! Status changes are conditional updates on the current status, and counters
//! are incremented in place, so concurrent workers and the job driver never
//! overwrite each other.

use std::collections::HashMap;

use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{DbPool, DieselError};
use super::records::{NewScrapeJobRecord, ScrapeJobRecord};
use super::util::{now_timestamp, retry_on_conflict, to_diesel_error};
use crate::models::{JobSeed, JobStatus, JobType, ScrapeJob};
use crate::schema::scrape_jobs;
use crate::with_conn;

#[derive(Clone)]
pub struct JobRepository {
    pool: DbPool,
}

impl JobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Store a new `queued` job with its seed plan.
    pub async fn create(
        &self,
        job_type: JobType,
        country: &str,
        states: &[String],
        seeds: &[JobSeed],
    ) -> Result<ScrapeJob, DieselError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_timestamp();
        let states_json = serde_json::to_string(states).map_err(to_diesel_error)?;
        let seeds_json = serde_json::to_string(seeds).map_err(to_diesel_error)?;

        let record = NewScrapeJobRecord {
            id: &id,
            job_type: job_type.as_str(),
            country,
            states: &states_json,
            seeds: &seeds_json,
            status: JobStatus::Queued.as_str(),
            query_index: 0,
            total_queries: seeds.len() as i32,
            urls_discovered: 0,
            urls_processed: 0,
            emails_found: 0,
            cancel_requested: 0,
            created_at: &now,
        };

        with_conn!(self.pool, conn => {
            diesel::insert_into(scrape_jobs::table)
                .values(&record)
                .execute(&mut conn)
                .await?;
        });

        self.get(&id).await?.ok_or(diesel::result::Error::NotFound)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ScrapeJob>, DieselError> {
        with_conn!(self.pool, conn => {
            scrape_jobs::table
                .find(id)
                .first::<ScrapeJobRecord>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(ScrapeJob::from))
        })
    }

    /// Newest jobs first.
    pub async fn list(&self, limit: u32) -> Result<Vec<ScrapeJob>, DieselError> {
        with_conn!(self.pool, conn => {
            scrape_jobs::table
                .order(scrape_jobs::created_at.desc())
                .limit(limit as i64)
                .load::<ScrapeJobRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(ScrapeJob::from).collect())
        })
    }

    /// Oldest queued job.
    pub async fn next_queued(&self) -> Result<Option<ScrapeJob>, DieselError> {
        with_conn!(self.pool, conn => {
            scrape_jobs::table
                .filter(scrape_jobs::status.eq(JobStatus::Queued.as_str()))
                .order(scrape_jobs::created_at.asc())
                .first::<ScrapeJobRecord>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(ScrapeJob::from))
        })
    }

    /// Queued and running jobs, oldest first.
    pub async fn active(&self) -> Result<Vec<ScrapeJob>, DieselError> {
        with_conn!(self.pool, conn => {
            scrape_jobs::table
                .filter(
                    scrape_jobs::status
                        .eq(JobStatus::Queued.as_str())
                        .or(scrape_jobs::status.eq(JobStatus::Running.as_str())),
                )
                .order(scrape_jobs::created_at.asc())
                .load::<ScrapeJobRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(ScrapeJob::from).collect())
        })
    }

    pub async fn has_active_for(&self, country: &str) -> Result<bool, DieselError> {
        let count: i64 = with_conn!(self.pool, conn => {
            scrape_jobs::table
                .filter(scrape_jobs::country.eq(country))
                .filter(
                    scrape_jobs::status
                        .eq(JobStatus::Queued.as_str())
                        .or(scrape_jobs::status.eq(JobStatus::Running.as_str())),
                )
                .select(count_star())
                .first(&mut conn)
                .await?
        });
        Ok(count > 0)
    }

    /// `queued → running`, stamping `started_at`. False if the job was not queued.
    pub async fn start(&self, id: &str) -> Result<bool, DieselError> {
        let now = now_timestamp();
        retry_on_conflict("job start", || async {
            with_conn!(self.pool, conn => {
                diesel::update(
                    scrape_jobs::table
                        .filter(scrape_jobs::id.eq(id))
                        .filter(scrape_jobs::status.eq(JobStatus::Queued.as_str())),
                )
                .set((
                    scrape_jobs::status.eq(JobStatus::Running.as_str()),
                    scrape_jobs::started_at.eq(Some(&now)),
                ))
                .execute(&mut conn)
                .await
                .map(|rows| rows == 1)
            })
        })
        .await
    }

    /// Move the seed cursor forward. A smaller or equal index is ignored.
    pub async fn advance_cursor(&self, id: &str, query_index: u32) -> Result<bool, DieselError> {
        let index = query_index as i32;
        retry_on_conflict("advance cursor", || async {
            with_conn!(self.pool, conn => {
                diesel::update(
                    scrape_jobs::table
                        .filter(scrape_jobs::id.eq(id))
                        .filter(scrape_jobs::query_index.lt(index)),
                )
                .set(scrape_jobs::query_index.eq(index))
                .execute(&mut conn)
                .await
                .map(|rows| rows == 1)
            })
        })
        .await
    }

    pub async fn add_discovered(&self, id: &str, count: u32) -> Result<(), DieselError> {
        if count == 0 {
            return Ok(());
        }
        let n = count as i32;
        retry_on_conflict("add discovered", || async {
            with_conn!(self.pool, conn => {
                diesel::update(scrape_jobs::table.filter(scrape_jobs::id.eq(id)))
                    .set(scrape_jobs::urls_discovered.eq(scrape_jobs::urls_discovered + n))
                    .execute(&mut conn)
                    .await
                    .map(|_| ())
            })
        })
        .await
    }

    /// Count one processed URL and the emails it yielded against a job.
    pub async fn record_url_processed(&self, id: &str, emails: u32) -> Result<(), DieselError> {
        let n = emails as i32;
        retry_on_conflict("record processed", || async {
            with_conn!(self.pool, conn => {
                diesel::update(scrape_jobs::table.filter(scrape_jobs::id.eq(id)))
                    .set((
                        scrape_jobs::urls_processed.eq(scrape_jobs::urls_processed + 1),
                        scrape_jobs::emails_found.eq(scrape_jobs::emails_found + n),
                    ))
                    .execute(&mut conn)
                    .await
                    .map(|_| ())
            })
        })
        .await
    }

    /// `running → completed`, stamping `completed_at`.
    pub async fn complete(&self, id: &str) -> Result<bool, DieselError> {
        let now = now_timestamp();
        retry_on_conflict("job complete", || async {
            with_conn!(self.pool, conn => {
                diesel::update(
                    scrape_jobs::table
                        .filter(scrape_jobs::id.eq(id))
                        .filter(scrape_jobs::status.eq(JobStatus::Running.as_str())),
                )
                .set((
                    scrape_jobs::status.eq(JobStatus::Completed.as_str()),
                    scrape_jobs::completed_at.eq(Some(&now)),
                ))
                .execute(&mut conn)
                .await
                .map(|rows| rows == 1)
            })
        })
        .await
    }

    /// Fail a queued or running job. The cursor and counters are kept.
    pub async fn fail(&self, id: &str, error: &str) -> Result<bool, DieselError> {
        let now = now_timestamp();
        retry_on_conflict("job fail", || async {
            with_conn!(self.pool, conn => {
                diesel::update(
                    scrape_jobs::table
                        .filter(scrape_jobs::id.eq(id))
                        .filter(
                            scrape_jobs::status
                                .eq(JobStatus::Queued.as_str())
                                .or(scrape_jobs::status.eq(JobStatus::Running.as_str())),
                        ),
                )
                .set((
                    scrape_jobs::status.eq(JobStatus::Failed.as_str()),
                    scrape_jobs::error.eq(Some(error)),
                    scrape_jobs::completed_at.eq(Some(&now)),
                ))
                .execute(&mut conn)
                .await
                .map(|rows| rows == 1)
            })
        })
        .await
    }

    /// Flag a running job for cancellation. False if it is not running.
    pub async fn request_cancel(&self, id: &str) -> Result<bool, DieselError> {
        with_conn!(self.pool, conn => {
            diesel::update(
                scrape_jobs::table
                    .filter(scrape_jobs::id.eq(id))
                    .filter(scrape_jobs::status.eq(JobStatus::Running.as_str())),
            )
            .set(scrape_jobs::cancel_requested.eq(1))
            .execute(&mut conn)
            .await
            .map(|rows| rows == 1)
        })
    }

    pub async fn is_cancel_requested(&self, id: &str) -> Result<bool, DieselError> {
        let flag: Option<i32> = with_conn!(self.pool, conn => {
            scrape_jobs::table
                .find(id)
                .select(scrape_jobs::cancel_requested)
                .first(&mut conn)
                .await
                .optional()?
        });
        Ok(flag.unwrap_or(0) != 0)
    }

    /// Count jobs by status. Statuses with no rows are reported as zero.
    pub async fn count_by_status(&self) -> Result<HashMap<JobStatus, u64>, DieselError> {
        let rows: Vec<(String, i64)> = with_conn!(self.pool, conn => {
            scrape_jobs::table
                .group_by(scrape_jobs::status)
                .select((scrape_jobs::status, count_star()))
                .load(&mut conn)
                .await?
        });

        let mut counts: HashMap<JobStatus, u64> =
            JobStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for (status, count) in rows {
            if let Some(status) = JobStatus::from_str(&status) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }
}
