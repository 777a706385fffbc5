//! Contact store with dedup by normalized email.
//!
//! Repeated sightings of an email merge into one row. A stored non-empty field
//! is never replaced; an incoming non-empty field only fills a blank one. The
//! merge is a single `INSERT ... ON CONFLICT (email) DO UPDATE`, so concurrent
//! upserts of the same email are arbitrated by the database.

use diesel::dsl::{count_star, sql};
use diesel::expression::SqlLiteral;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::RunQueryDsl;
use thiserror::Error;
use tracing::debug;

use super::pool::{DbPool, DieselError};
use super::records::{ContactRow, NewContactRow};
use super::util::{now_timestamp, retry_on_conflict};
use crate::models::{normalize_email, Contact, ContactRecord, UpsertOutcome};
use crate::schema::contacts;
use crate::with_conn;

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("invalid email: {0:?}")]
    InvalidEmail(String),
    #[error("storage error: {0}")]
    Storage(#[from] DieselError),
}

/// `CASE` expression that keeps the stored value unless it is blank.
fn fill_blank(column: &str) -> SqlLiteral<Text> {
    sql::<Text>(&format!(
        "CASE WHEN contacts.{column} = '' THEN excluded.{column} ELSE contacts.{column} END"
    ))
}

#[derive(Clone)]
pub struct ContactRepository {
    pool: DbPool,
}

impl ContactRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a contact or merge it into the existing row for its email.
    pub async fn upsert(&self, record: &ContactRecord) -> Result<UpsertOutcome, ContactError> {
        let email = normalize_email(&record.email)
            .ok_or_else(|| ContactError::InvalidEmail(record.email.clone()))?;

        let now = now_timestamp();
        retry_on_conflict("contact upsert", || self.merge_row(&email, record, &now)).await?;

        // A fresh row carries this call's timestamp as created_at.
        let created_at: String = with_conn!(self.pool, conn => {
            contacts::table
                .filter(contacts::email.eq(&email))
                .select(contacts::created_at)
                .first(&mut conn)
                .await?
        });

        let outcome = if created_at == now {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Merged
        };
        debug!("Contact {} {:?}", email, outcome);
        Ok(outcome)
    }

    async fn merge_row(
        &self,
        email: &str,
        record: &ContactRecord,
        now: &str,
    ) -> Result<usize, DieselError> {
        let row = NewContactRow::from_record(email, record, now);
        with_conn!(self.pool, conn => {
            diesel::insert_into(contacts::table)
                .values(&row)
                .on_conflict(contacts::email)
                .do_update()
                .set((
                    contacts::farm_name.eq(fill_blank("farm_name")),
                    contacts::owner_name.eq(fill_blank("owner_name")),
                    contacts::phone.eq(fill_blank("phone")),
                    contacts::address.eq(fill_blank("address")),
                    contacts::city.eq(fill_blank("city")),
                    contacts::state.eq(fill_blank("state")),
                    contacts::zip_code.eq(fill_blank("zip_code")),
                    contacts::country.eq(fill_blank("country")),
                    contacts::website.eq(fill_blank("website")),
                    contacts::facebook.eq(fill_blank("facebook")),
                    contacts::instagram.eq(fill_blank("instagram")),
                    contacts::cattle_type.eq(fill_blank("cattle_type")),
                    contacts::breed.eq(fill_blank("breed")),
                    contacts::head_count.eq(fill_blank("head_count")),
                    contacts::source_url.eq(fill_blank("source_url")),
                    contacts::updated_at.eq(sql::<Text>("excluded.updated_at")),
                ))
                .execute(&mut conn)
                .await
        })
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<Contact>, DieselError> {
        let Some(email) = normalize_email(email) else {
            return Ok(None);
        };
        with_conn!(self.pool, conn => {
            contacts::table
                .filter(contacts::email.eq(&email))
                .first::<ContactRow>(&mut conn)
                .await
                .optional()
                .map(|r| r.map(Contact::from))
        })
    }

    pub async fn count(&self) -> Result<u64, DieselError> {
        with_conn!(self.pool, conn => {
            contacts::table
                .select(count_star())
                .first::<i64>(&mut conn)
                .await
                .map(|c| c as u64)
        })
    }

    /// Number of contacts first attributed to a page.
    pub async fn count_by_source_url(&self, source_url: &str) -> Result<u64, DieselError> {
        with_conn!(self.pool, conn => {
            contacts::table
                .filter(contacts::source_url.eq(source_url))
                .select(count_star())
                .first::<i64>(&mut conn)
                .await
                .map(|c| c as u64)
        })
    }

    /// Newest contacts first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<Contact>, DieselError> {
        with_conn!(self.pool, conn => {
            contacts::table
                .order((contacts::created_at.desc(), contacts::id.desc()))
                .limit(limit as i64)
                .load::<ContactRow>(&mut conn)
                .await
                .map(|rows| rows.into_iter().map(Contact::from).collect())
        })
    }

    /// Every contact in insertion order, for export.
    pub async fn export_all(&self) -> Result<Vec<Contact>, DieselError> {
        with_conn!(self.pool, conn => {
            contacts::table
                .order(contacts::id.asc())
                .load::<ContactRow>(&mut conn)
                .await
                .map(|rows| rows.into_iter().map(Contact::from).collect())
        })
    }
}
