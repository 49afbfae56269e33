use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use marketsync_core::{AppConfig, MemoryStore, ServiceContext};

/// Selects the `text` or `json` log formatter.
pub const LOG_FORMAT_ENV: &str = "MARKETSYNC_LOG_FORMAT";

pub fn init_tracing() {
    let log_format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub fn build_context(config: &AppConfig) -> anyhow::Result<ServiceContext> {
    let store = Arc::new(MemoryStore::new());
    let context = ServiceContext::build(config, store)?;

    for provider in context.registry.provider_status() {
        tracing::info!(
            provider = %provider.name,
            priority = provider.priority,
            available = provider.available,
            historical = provider.historical_metrics,
            "Provider registered"
        );
    }
    for stats in context.registry.rate_limiter_stats() {
        tracing::info!(
            limiter = %stats.name,
            max_calls = stats.max_calls,
            window_secs = stats.window_secs,
            "Rate limiter ready"
        );
    }
    Ok(context)
}

/// Log each job's state and every limiter's counters.
pub fn log_summary(context: &ServiceContext) {
    for job in context.jobs.jobs() {
        match serde_json::to_string(&job) {
            Ok(json) => tracing::info!(job = %job.job_id, "{}", json),
            Err(e) => tracing::warn!(job = %job.job_id, "Failed to render job status: {}", e),
        }
    }
    for stats in context.registry.rate_limiter_stats() {
        tracing::info!(
            limiter = %stats.name,
            total_calls = stats.total_calls,
            total_waits = stats.total_waits,
            avg_wait_secs = stats.avg_wait_secs,
            "Rate limiter usage"
        );
    }
}
