//! Worker pool types and events.

use std::time::Duration;

/// Events emitted by workers for progress display.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A worker claimed a batch of URLs
    Claimed { worker_id: usize, count: usize },
    /// A URL reached `completed`
    Completed {
        worker_id: usize,
        url: String,
        emails: u32,
        /// Completed from existing contacts without a fetch
        skipped: bool,
    },
    /// A URL reached `failed`
    Failed {
        worker_id: usize,
        url: String,
        error: String,
    },
    /// A worker exited its loop
    Stopped { worker_id: usize },
}

/// Totals across all workers of one pool run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub completed: usize,
    pub failed: usize,
    pub emails: usize,
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub workers: usize,
    pub batch_size: u32,
    pub fetch_timeout: Duration,
    /// Total fetch attempts per claim, including the first.
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
    pub idle_poll: Duration,
    /// Exit once the frontier has no pending rows instead of polling forever.
    pub until_idle: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            batch_size: 25,
            fetch_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            idle_poll: Duration::from_secs(2),
            until_idle: false,
        }
    }
}

impl WorkerConfig {
    /// Delay before retry number `attempt` (1-based): `retry_backoff * 2^(attempt-1)`,
    /// capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// What processing one claimed URL did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlOutcome {
    Completed { emails: u32, discovered: usize },
    /// A contact already cites this page, so it was not fetched again.
    Skipped { emails: u32 },
    Failed { error: String },
}
