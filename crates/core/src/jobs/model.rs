//! Job identifiers and run outcomes.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use marketsync_market_data::ProviderFailure;

use crate::sync::{ConsistencySummary, RunStatus, SyncReport, SyncRunStats};

/// The independently scheduled jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    StockRosterSync,
    DailyMetricsSync,
    ProviderLivenessCheck,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        Self::StockRosterSync,
        Self::DailyMetricsSync,
        Self::ProviderLivenessCheck,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::StockRosterSync => "stock_roster_sync",
            Self::DailyMetricsSync => "daily_metrics_sync",
            Self::ProviderLivenessCheck => "provider_liveness_check",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Result of one triggered or scheduled run, as kept in history and
/// written to `sync_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub id: Uuid,
    pub job_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: SyncRunStats,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ProviderFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency: Option<ConsistencySummary>,
}

impl RunOutcome {
    pub(crate) fn from_report(
        job: JobKind,
        started_at: DateTime<Utc>,
        report: &SyncReport,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: job.id().to_string(),
            status: report.status,
            started_at,
            finished_at: Utc::now(),
            stats: report.stats.clone(),
            message: report.message.clone(),
            failures: report.failures.clone(),
            consistency: report.consistency.as_ref().map(ConsistencySummary::from),
        }
    }

    /// Outcome of a run that never started because another was in progress.
    pub(crate) fn skipped(job: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_id: job.id().to_string(),
            status: RunStatus::Skipped,
            started_at: now,
            finished_at: now,
            stats: SyncRunStats::default(),
            message: "already running".to_string(),
            failures: Vec::new(),
            consistency: None,
        }
    }
}

/// Operational view of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub enabled: bool,
    pub paused: bool,
    pub running: bool,
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    pub last_outcome: Option<RunOutcome>,
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}
