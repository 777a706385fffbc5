//! URL frontier repository.
//!
//! Split into submodules:
//! - `mod.rs` (this file): struct and error type
//! - `enqueue.rs`: insert-if-absent
//! - `claim.rs`: conditional claim and terminal transitions
//! - `reclaim.rs`: operator resets and stale-claim recovery
//! - `stats.rs`: counts and lookups

mod claim;
mod enqueue;
mod reclaim;
mod stats;

pub use reclaim::{ReclaimOutcome, ReclaimPolicy};

use thiserror::Error;

use super::pool::{DbPool, DieselError};

/// Errors surfaced by frontier writes.
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("storage error: {0}")]
    Storage(#[from] DieselError),
}

/// Persistent queue of URLs with status transitions.
#[derive(Clone)]
pub struct FrontierRepository {
    pool: DbPool,
}

impl FrontierRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}
