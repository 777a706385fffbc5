//! Executed search queries, shared across jobs so a query is issued once.

use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{DbPool, DieselError};
use super::records::{NewSearchQueryRecord, SearchQueryRecord};
use super::util::{now_timestamp, retry_on_conflict};
use crate::models::SearchQuery;
use crate::schema::search_queries;
use crate::with_conn;

#[derive(Clone)]
pub struct SearchQueryRepository {
    pool: DbPool,
}

impl SearchQueryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Whether this exact query text has already been executed by any job.
    pub async fn is_done(&self, query: &str) -> Result<bool, DieselError> {
        let count: i64 = with_conn!(self.pool, conn => {
            search_queries::table
                .filter(search_queries::query.eq(query))
                .select(count_star())
                .first(&mut conn)
                .await?
        });
        Ok(count > 0)
    }

    /// Record an executed query. The first recording wins; returns false if the
    /// query was already known.
    pub async fn record(
        &self,
        query: &str,
        results_count: u32,
        urls_found: u32,
        job_id: Option<&str>,
    ) -> Result<bool, DieselError> {
        let now = now_timestamp();
        let record = NewSearchQueryRecord {
            query,
            results_count: results_count as i32,
            urls_found: urls_found as i32,
            job_id,
            executed_at: &now,
        };
        retry_on_conflict("record query", || async {
            with_conn!(self.pool, conn => {
                diesel::insert_into(search_queries::table)
                    .values(&record)
                    .on_conflict(search_queries::query)
                    .do_nothing()
                    .execute(&mut conn)
                    .await
                    .map(|rows| rows > 0)
            })
        })
        .await
    }

    pub async fn count(&self) -> Result<u64, DieselError> {
        with_conn!(self.pool, conn => {
            search_queries::table
                .select(count_star())
                .first::<i64>(&mut conn)
                .await
                .map(|c| c as u64)
        })
    }

    /// Most recently executed queries.
    pub async fn recent(&self, limit: u32) -> Result<Vec<SearchQuery>, DieselError> {
        with_conn!(self.pool, conn => {
            search_queries::table
                .order((search_queries::executed_at.desc(), search_queries::id.desc()))
                .limit(limit as i64)
                .load::<SearchQueryRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(SearchQuery::from).collect())
        })
    }
}
