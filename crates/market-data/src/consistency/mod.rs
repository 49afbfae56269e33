//! Cross-provider consistency checking.
//!
//! `ConsistencyChecker::check` compares two providers' metrics for the same
//! date and recommends a `ResolutionStrategy`; `resolve` applies it and
//! produces the records to persist. Both are pure functions of their inputs.

mod checker;
mod config;
mod resolver;

pub use checker::{
    ConsistencyChecker, ConsistencyReport, FieldDifference, ResolutionStrategy, EPSILON,
};
pub use config::ConsistencyConfig;
pub use resolver::{resolve, Resolution, ResolvedRecord};
