//! Connection sources for the crawl store.
//!
//! SQLite is the default; PostgreSQL is available behind the `postgres`
//! feature. Repositories never touch a connection type directly: they go
//! through `with_conn!` or `with_conn_split!`, which dispatch on the variant.

use std::path::Path;

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};

#[cfg(feature = "postgres")]
use diesel_async::pooled_connection::deadpool::Pool as DeadPool;
#[cfg(feature = "postgres")]
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
#[cfg(feature = "postgres")]
use diesel_async::AsyncPgConnection;

use super::util::to_diesel_error;

/// Diesel error type alias.
pub type DieselError = diesel::result::Error;

/// Async SQLite connection type.
pub type SqliteConn = SyncConnectionWrapper<SqliteConnection>;

/// Async PostgreSQL connection type.
#[cfg(feature = "postgres")]
pub type PgConn = deadpool::managed::Object<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// How long SQLite waits on a locked database before reporting busy.
const SQLITE_BUSY_TIMEOUT_MS: u32 = 5_000;

/// Connections kept beyond one per worker, for job drivers, the reclaimer and
/// the HTTP API.
const CONNECTION_HEADROOM: usize = 4;

/// Postgres connection cap for a crawl running `workers` workers.
pub fn connections_for_workers(workers: usize) -> usize {
    workers.max(1) + CONNECTION_HEADROOM
}

/// SQLite "pool": every checkout opens a fresh connection to the file, so
/// concurrent writers are serialized by SQLite's own locking.
#[derive(Clone)]
pub struct SqlitePool {
    path: String,
}

impl SqlitePool {
    /// Accepts a plain path or a `sqlite:` URL.
    pub fn new(database_url: &str) -> Self {
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        Self {
            path: path.to_string(),
        }
    }

    /// Open a connection that waits on locks instead of failing fast and
    /// enforces foreign keys.
    pub async fn get(&self) -> Result<SqliteConn, DieselError> {
        let mut conn = SqliteConn::establish(&self.path)
            .await
            .map_err(to_diesel_error)?;
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            SQLITE_BUSY_TIMEOUT_MS
        ))
        .await?;
        Ok(conn)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// PostgreSQL connections shared through deadpool.
#[cfg(feature = "postgres")]
#[derive(Clone)]
pub struct PgPool {
    pool: DeadPool<AsyncPgConnection>,
}

#[cfg(feature = "postgres")]
impl PgPool {
    pub fn new(database_url: &str, max_connections: usize) -> Result<Self, DieselError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = DeadPool::builder(manager)
            .max_size(max_connections.max(1))
            .build()
            .map_err(to_diesel_error)?;
        Ok(Self { pool })
    }

    pub async fn get(&self) -> Result<PgConn, DieselError> {
        self.pool.get().await.map_err(to_diesel_error)
    }
}

/// The crawl store's connection source, SQLite file or Postgres server.
#[derive(Clone)]
pub enum DbPool {
    Sqlite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl DbPool {
    /// Pick the backend from the URL: `postgres://` and `postgresql://` go to
    /// Postgres (with at most `max_connections` open), anything else is a
    /// SQLite path.
    pub fn from_url(url: &str, max_connections: usize) -> Result<Self, DieselError> {
        #[cfg(feature = "postgres")]
        if super::util::is_postgres_url(url) {
            return Ok(DbPool::Postgres(PgPool::new(url, max_connections)?));
        }
        #[cfg(not(feature = "postgres"))]
        let _ = max_connections;

        Ok(DbPool::Sqlite(SqlitePool::new(url)))
    }

    pub fn sqlite(path: &Path) -> Self {
        DbPool::Sqlite(SqlitePool::new(&path.display().to_string()))
    }

    /// Short backend name for logs.
    pub fn backend(&self) -> &'static str {
        match self {
            DbPool::Sqlite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            DbPool::Postgres(_) => "postgres",
        }
    }
}

/// Macro for running database operations on either backend.
///
/// This macro handles the connection dispatch, allowing the same Diesel DSL
/// code to run on both SQLite and PostgreSQL.
///
/// # Example
/// ```ignore
/// with_conn!(self.pool, conn => {
///     contacts::table.count().get_result::<i64>(&mut conn).await
/// })
/// ```
#[macro_export]
macro_rules! with_conn {
    ($pool:expr, $conn:ident => $body:expr) => {{
        match &$pool {
            $crate::repository::pool::DbPool::Sqlite(pool) => {
                let mut $conn = pool.get().await?;
                $body
            }
            #[cfg(feature = "postgres")]
            $crate::repository::pool::DbPool::Postgres(pool) => {
                let mut $conn = pool.get().await?;
                $body
            }
        }
    }};
}

/// Macro for running database operations that need different SQL per backend.
#[macro_export]
macro_rules! with_conn_split {
    ($pool:expr, sqlite: $sqlite_conn:ident => $sqlite_body:expr, postgres: $pg_conn:ident => $pg_body:expr) => {{
        match &$pool {
            $crate::repository::pool::DbPool::Sqlite(pool) => {
                let mut $sqlite_conn = pool.get().await?;
                $sqlite_body
            }
            #[cfg(feature = "postgres")]
            $crate::repository::pool::DbPool::Postgres(pool) => {
                let mut $pg_conn = pool.get().await?;
                $pg_body
            }
        }
    }};
}
