//! Job scheduling and operational history.

mod controller;
mod model;

pub use controller::JobController;
pub use model::{JobKind, JobStatus, RunOutcome};
