//! Service layer for herdscout crawl logic.
//!
//! Domain logic separated from UI concerns, shared by the CLI and the
//! server. Long-running services report progress through event channels.

pub mod jobs;
pub mod orchestrator;
pub mod worker;

pub use jobs::{CancelOutcome, JobError, JobManager, JobSettings, RunOutcome};
pub use orchestrator::{
    reclaim_all, shutdown_on_ctrl_c, Orchestrator, OrchestratorConfig, OrchestratorSummary,
};
pub use worker::{UrlOutcome, WorkerConfig, WorkerEvent, WorkerPool, WorkerSummary};
