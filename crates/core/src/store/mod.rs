//! Persistence for sync output.

mod memory;
mod traits;

pub use memory::MemoryStore;
pub use traits::{DocumentFilter, DocumentStore, UpsertOutcome};
