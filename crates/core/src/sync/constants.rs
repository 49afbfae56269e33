use chrono::NaiveDate;

/// Roster rows, keyed by code.
pub const STOCK_BASIC_COLLECTION: &str = "stock_basic_info";

/// Resolved daily metrics, keyed by `code:YYYYMMDD`.
pub const DAILY_METRICS_COLLECTION: &str = "stock_daily_metrics";

/// Latest liveness result per provider, keyed by provider id.
pub const PROVIDER_STATUS_COLLECTION: &str = "provider_status";

/// Latest run outcome per job, keyed by job id.
pub const SYNC_STATUS_COLLECTION: &str = "sync_status";

/// Default timeout of a job's fetch step.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 600;

/// Key of one instrument's metrics for one date.
pub fn daily_metrics_key(code: &str, date: NaiveDate) -> String {
    format!("{}:{}", code, date.format("%Y%m%d"))
}
