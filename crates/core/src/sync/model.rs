//! Sync run domain models.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use marketsync_market_data::{ConsistencyReport, MetricField, ProviderFailure, ResolutionStrategy};

/// Steps of one sync run, in the order they are entered.
///
/// `Reconciling` only appears when two providers answered for the same
/// entities and date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Started,
    Fetching,
    Reconciling,
    Persisting,
    Completed,
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Fetching => "fetching",
            Self::Reconciling => "reconciling",
            Self::Persisting => "persisting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Completed with every row persisted
    Success,
    /// Completed, but some rows failed to persist
    SuccessWithErrors,
    /// No usable data was fetched
    Failed,
    /// Not started because the job was already running
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SuccessWithErrors => "success_with_errors",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunStats {
    /// Rows handed to persistence
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Rows that failed to persist
    pub errored: usize,
    /// Rows persisted as provisional pending review
    pub provisional: usize,
    /// Provider whose data was used
    pub source: Option<String>,
    /// Provider the data was compared against
    pub secondary_source: Option<String>,
    /// Providers whose values were persisted, primary first
    #[serde(default)]
    pub sources_used: Vec<String>,
    pub trade_date: Option<NaiveDate>,
    pub resolution_strategy: Option<ResolutionStrategy>,
    pub confidence_score: Option<f64>,
    pub duration_ms: u64,
}

/// Condensed consistency report kept with a run outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencySummary {
    pub primary_source: String,
    pub secondary_source: String,
    pub confidence_score: f64,
    pub is_consistent: bool,
    pub resolution_strategy: ResolutionStrategy,
    pub significant_fields: Vec<MetricField>,
    pub overlapping_entities: usize,
}

impl From<&ConsistencyReport> for ConsistencySummary {
    fn from(report: &ConsistencyReport) -> Self {
        Self {
            primary_source: report.primary_source.to_string(),
            secondary_source: report.secondary_source.to_string(),
            confidence_score: report.confidence_score,
            is_consistent: report.is_consistent,
            resolution_strategy: report.resolution_strategy,
            significant_fields: report.significant_fields(),
            overlapping_entities: report.overlapping_entities,
        }
    }
}

/// Everything one orchestrator run produced.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub status: RunStatus,
    /// Phases entered, in order
    pub phases: Vec<SyncPhase>,
    pub stats: SyncRunStats,
    pub message: String,
    /// Provider failures seen while fetching
    pub failures: Vec<ProviderFailure>,
    /// Present when two providers were compared
    pub consistency: Option<ConsistencyReport>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Success | RunStatus::SuccessWithErrors)
    }
}
