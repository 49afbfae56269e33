//! Sync orchestration and run models.

mod constants;
mod model;
mod orchestrator;

pub use constants::*;
pub use model::*;
pub use orchestrator::SyncOrchestrator;
