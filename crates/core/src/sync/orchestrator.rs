//! Sync orchestration.
//!
//! This module provides the `SyncOrchestrator`, which drives one end-to-end
//! cycle per call: fetch through the provider registry, reconcile when two
//! providers answered, and persist the resolved rows.
//!
//! # Architecture
//!
//! ```text
//! SyncOrchestrator
//!       │
//!       ├─► ProviderRegistry (fallback fetch, liveness)
//!       ├─► ConsistencyChecker + resolve (reconciliation)
//!       └─► DocumentStore (upsert by key)
//! ```
//!
//! Each run walks `Started → Fetching → (Reconciling) → Persisting →
//! Completed | Failed`. Only a fetch that yields no usable data fails the
//! run; per-row persistence errors are counted and the batch continues.
//! The fetch step runs under the job timeout, and nothing is persisted from
//! a fetch that timed out.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::Serialize;

use marketsync_market_data::{
    resolve, ConsistencyChecker, FailureKind, MarketDataError, MetricField, ProviderFailure,
    ProviderHealth, ProviderRegistry, Resolution, ResolutionStrategy, ResolvedRecord, StockInfo,
};

use super::constants::*;
use super::model::{RunStatus, SyncPhase, SyncReport, SyncRunStats};
use crate::store::{DocumentStore, UpsertOutcome};

// =============================================================================
// Persisted documents
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RosterDocument<'a> {
    #[serde(flatten)]
    stock: &'a StockInfo,
    source: &'a str,
}

/// Stored form of one resolved record. Carries no timestamps, so re-running
/// a sync on unchanged data stores identical documents.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsDocument<'a> {
    code: &'a str,
    trade_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(flatten)]
    values: &'a BTreeMap<MetricField, Decimal>,
    sources: Vec<&'a str>,
    provisional: bool,
    resolution_strategy: ResolutionStrategy,
    confidence_score: f64,
}

impl<'a> MetricsDocument<'a> {
    fn new(resolved: &'a ResolvedRecord, resolution: &Resolution) -> Self {
        Self {
            code: &resolved.record.code,
            trade_date: resolution.as_of.format("%Y%m%d").to_string(),
            name: resolved.record.name.as_deref(),
            values: &resolved.record.values,
            sources: resolved.sources.iter().map(|s| s.as_ref()).collect(),
            provisional: resolved.provisional,
            resolution_strategy: resolution.strategy,
            confidence_score: resolution.confidence_score,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderStatusDocument<'a> {
    #[serde(flatten)]
    health: &'a ProviderHealth,
    healthy: bool,
    checked_at: String,
}

// =============================================================================
// Run tracking
// =============================================================================

/// Phase trail and counters of the run in progress.
struct RunTracker {
    job: &'static str,
    started: Instant,
    phases: Vec<SyncPhase>,
    stats: SyncRunStats,
    failures: Vec<ProviderFailure>,
}

impl RunTracker {
    fn start(job: &'static str) -> Self {
        debug!("[{}] {}", job, SyncPhase::Started);
        Self {
            job,
            started: Instant::now(),
            phases: vec![SyncPhase::Started],
            stats: SyncRunStats::default(),
            failures: Vec::new(),
        }
    }

    fn enter(&mut self, phase: SyncPhase) {
        debug!("[{}] {}", self.job, phase);
        self.phases.push(phase);
    }

    fn record(&mut self, outcome: Option<UpsertOutcome>) {
        match outcome {
            Some(UpsertOutcome::Inserted) => self.stats.inserted += 1,
            Some(UpsertOutcome::Updated) => self.stats.updated += 1,
            None => self.stats.errored += 1,
        }
    }

    fn finish(mut self, message: String) -> SyncReport {
        self.enter(SyncPhase::Completed);
        self.stats.duration_ms = self.started.elapsed().as_millis() as u64;
        let status = if self.stats.errored > 0 {
            RunStatus::SuccessWithErrors
        } else {
            RunStatus::Success
        };
        info!(
            "[{}] {}: {} (inserted {}, updated {}, errored {})",
            self.job,
            status,
            message,
            self.stats.inserted,
            self.stats.updated,
            self.stats.errored
        );
        SyncReport {
            status,
            phases: self.phases,
            stats: self.stats,
            message,
            failures: self.failures,
            consistency: None,
        }
    }

    fn fail(mut self, message: String) -> SyncReport {
        self.enter(SyncPhase::Failed);
        self.stats.duration_ms = self.started.elapsed().as_millis() as u64;
        warn!("[{}] failed: {}", self.job, message);
        SyncReport {
            status: RunStatus::Failed,
            phases: self.phases,
            stats: self.stats,
            message,
            failures: self.failures,
            consistency: None,
        }
    }

    fn fetch_failed(mut self, error: MarketDataError) -> SyncReport {
        self.failures = error.provider_failures().to_vec();
        self.fail(error.to_string())
    }

    fn timed_out(self, timeout: Duration) -> SyncReport {
        self.fail(format!("fetch exceeded the job timeout of {:?}", timeout))
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct SyncOrchestrator {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn DocumentStore>,
    checker: ConsistencyChecker,
    job_timeout: Duration,
    preferred: Vec<String>,
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn DocumentStore>,
        checker: ConsistencyChecker,
    ) -> Self {
        Self {
            registry,
            store,
            checker,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            preferred: Vec::new(),
        }
    }

    pub fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    /// Providers to try first, in order.
    pub fn with_preferred_providers(mut self, preferred: Vec<String>) -> Self {
        self.preferred = preferred;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Fetch the roster from the first provider that has it and upsert every
    /// row into `stock_basic_info`.
    pub async fn sync_stock_roster(&self) -> SyncReport {
        let mut run = RunTracker::start("stock_roster_sync");

        run.enter(SyncPhase::Fetching);
        let fetched = match tokio::time::timeout(
            self.job_timeout,
            self.registry.fetch_stock_list(&self.preferred),
        )
        .await
        {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(e)) => return run.fetch_failed(e),
            Err(_) => return run.timed_out(self.job_timeout),
        };
        let roster = fetched.data;
        run.failures = fetched.diagnostics.failures();

        run.enter(SyncPhase::Persisting);
        run.stats.fetched = roster.len();
        run.stats.source = Some(roster.source.to_string());
        run.stats.sources_used = vec![roster.source.to_string()];
        run.stats.trade_date = Some(roster.as_of);
        for (code, stock) in &roster.rows {
            let document = RosterDocument {
                stock,
                source: &roster.source,
            };
            let outcome = self.persist(STOCK_BASIC_COLLECTION, code, &document).await;
            run.record(outcome);
        }

        let message = format!(
            "{} instruments from {} ({})",
            roster.len(),
            roster.source,
            fetched.diagnostics.summary()
        );
        run.finish(message)
    }

    /// Fetch daily metrics for `date` (the latest trade date when `None`),
    /// reconcile them against a second provider when one answers, and
    /// upsert the resolved rows into `stock_daily_metrics`.
    pub async fn sync_daily_metrics(&self, date: Option<NaiveDate>) -> SyncReport {
        let mut run = RunTracker::start("daily_metrics_sync");

        run.enter(SyncPhase::Fetching);
        let fetch = async {
            let date = match date {
                Some(date) => date,
                None => {
                    let latest = self.registry.find_latest_trade_date(&self.preferred).await?;
                    info!(
                        "Latest trade date {} ({})",
                        latest.data,
                        latest.diagnostics.summary()
                    );
                    latest.data
                }
            };
            self.registry
                .fetch_daily_metrics_checked(date, &self.preferred)
                .await
        };
        let fetched = match tokio::time::timeout(self.job_timeout, fetch).await {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(e)) => return run.fetch_failed(e),
            Err(_) => return run.timed_out(self.job_timeout),
        };
        run.failures = fetched.diagnostics.failures();

        let report = fetched
            .secondary
            .as_ref()
            .and_then(|secondary| self.checker.check(&fetched.primary, secondary));
        if report.is_some() {
            run.enter(SyncPhase::Reconciling);
        }
        let resolution = resolve(&fetched.primary, fetched.secondary.as_ref(), report.as_ref());

        run.enter(SyncPhase::Persisting);
        run.stats.fetched = resolution.records.len();
        run.stats.source = Some(fetched.primary.source.to_string());
        run.stats.secondary_source = fetched.secondary.as_ref().map(|s| s.source.to_string());
        run.stats.sources_used = resolution
            .contributors
            .iter()
            .map(|source| source.to_string())
            .collect();
        run.stats.trade_date = Some(resolution.as_of);
        run.stats.resolution_strategy = Some(resolution.strategy);
        run.stats.confidence_score = Some(resolution.confidence_score);
        for (code, resolved) in &resolution.records {
            if resolved.provisional {
                run.stats.provisional += 1;
            }
            let key = daily_metrics_key(code, resolution.as_of);
            let document = MetricsDocument::new(resolved, &resolution);
            let outcome = self.persist(DAILY_METRICS_COLLECTION, &key, &document).await;
            run.record(outcome);
        }

        let message = format!(
            "{} records for {} via {} at confidence {:.2} ({})",
            resolution.records.len(),
            resolution.as_of,
            resolution.strategy,
            resolution.confidence_score,
            fetched.diagnostics.summary()
        );
        let mut sync_report = run.finish(message);
        sync_report.consistency = report;
        sync_report
    }

    /// Probe every provider and upsert its status into `provider_status`.
    ///
    /// Fails only when no provider is healthy.
    pub async fn check_provider_liveness(&self) -> SyncReport {
        let mut run = RunTracker::start("provider_liveness_check");

        run.enter(SyncPhase::Fetching);
        let health = match tokio::time::timeout(self.job_timeout, self.registry.check_liveness())
            .await
        {
            Ok(health) => health,
            Err(_) => return run.timed_out(self.job_timeout),
        };

        run.failures = health
            .iter()
            .filter(|h| !h.is_healthy())
            .map(|h| {
                let kind = if h.provider.available {
                    FailureKind::Error
                } else {
                    FailureKind::Unavailable
                };
                let message = h.error.clone().unwrap_or_default();
                ProviderFailure::new(h.provider.name.clone(), kind, message)
            })
            .collect();

        run.enter(SyncPhase::Persisting);
        run.stats.fetched = health.len();
        let checked_at = Utc::now().to_rfc3339();
        for entry in &health {
            let document = ProviderStatusDocument {
                health: entry,
                healthy: entry.is_healthy(),
                checked_at: checked_at.clone(),
            };
            let outcome = self
                .persist(PROVIDER_STATUS_COLLECTION, &entry.provider.name, &document)
                .await;
            run.record(outcome);
        }

        let healthy: Vec<&str> = health
            .iter()
            .filter(|h| h.is_healthy())
            .map(|h| h.provider.name.as_ref())
            .collect();
        if healthy.is_empty() {
            return run.fail(format!("no healthy provider among {}", health.len()));
        }
        run.stats.source = healthy.first().map(|s| s.to_string());
        run.stats.sources_used = healthy.iter().map(|s| s.to_string()).collect();
        run.stats.trade_date = health
            .iter()
            .find(|h| h.is_healthy())
            .and_then(|h| h.latest_trade_date);

        let message = format!("{} of {} providers healthy", healthy.len(), health.len());
        run.finish(message)
    }

    /// Upsert one document. Failures are logged and reported as `None` so
    /// the caller can count them and carry on.
    async fn persist<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        document: &T,
    ) -> Option<UpsertOutcome> {
        let value = match serde_json::to_value(document) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to serialize {}/{}: {}", collection, key, e);
                return None;
            }
        };
        match self.store.upsert(collection, key, value).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Failed to upsert {}/{}: {}", collection, key, e);
                None
            }
        }
    }
}
