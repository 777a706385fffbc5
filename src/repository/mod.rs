//! Repository layer for database persistence.
//!
//! All database access uses Diesel with diesel-async. SQLite is the default
//! backend; PostgreSQL is available behind the `postgres` feature.

pub mod context;
pub mod contacts;
pub mod frontier;
pub mod jobs;
pub mod metrics;
pub mod pool;
pub mod records;
pub mod search_queries;
pub mod util;

pub use context::DbContext;
pub use contacts::{ContactError, ContactRepository};
pub use frontier::{FrontierError, FrontierRepository, ReclaimOutcome, ReclaimPolicy};
pub use jobs::JobRepository;
pub use metrics::{CountryStateCount, DashboardStats, HourlyCount, LabelCount, MetricsRepository};
pub use pool::{DbPool, DieselError};
pub use search_queries::SearchQueryRepository;
pub use util::{is_conflict, now_timestamp, retry_on_conflict};

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
