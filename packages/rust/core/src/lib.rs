//! Enrichment orchestration and domain logic for LeadScout.
//!
//! This crate ties together record preparation, people-search sources, the
//! progress store and the exporters into end-to-end jobs (e.g., `run_job`).

pub mod merge;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod summary;

pub use merge::ResultMerger;
pub use orchestrator::{EnrichmentObserver, EnrichmentOrchestrator, RunReport, SilentObserver};
pub use pipeline::{
    JobConfig, JobResult, PrepareResult, prepare_job, run_job, summarize_store,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{BatchScheduler, Boundary, Pacer};
pub use summary::{RunTotals, summarize, summarize_state};
