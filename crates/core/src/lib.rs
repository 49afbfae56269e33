//! MarketSync Core - configuration, persistence, sync orchestration and jobs.
//!
//! This crate drives the provider registry from `marketsync-market-data`
//! on a schedule and persists reconciled rows through the
//! [`store::DocumentStore`] trait.

pub mod config;
pub mod context;
pub mod errors;
pub mod jobs;
pub mod store;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use config::AppConfig;
pub use context::ServiceContext;
pub use jobs::{JobController, JobKind, JobStatus, RunOutcome};
pub use store::{DocumentFilter, DocumentStore, MemoryStore, UpsertOutcome};
pub use sync::{RunStatus, SyncOrchestrator, SyncPhase, SyncReport, SyncRunStats};

// Re-export error types
pub use errors::Error;
pub use errors::Result;
