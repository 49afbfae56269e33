//! Per-job scheduling, trigger, pause/resume and run history.
//!
//! Every job runs on its own tokio task: an initial delay, then a fixed
//! interval. A paused job keeps ticking but skips its runs; a manual trigger
//! still runs it. A job never runs twice at once: a trigger that arrives
//! while a run is in progress returns a `skipped` outcome.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use marketsync_market_data::ConsistencyReport;

use super::model::{JobKind, JobStatus, RunOutcome};
use crate::config::{JobConfig, JobsConfig};
use crate::errors::{Error, Result};
use crate::sync::{SyncOrchestrator, SYNC_STATUS_COLLECTION};

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("{} mutex was poisoned, recovering", what);
        poisoned.into_inner()
    })
}

/// Clears the running flag when the run ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct JobState {
    schedule: JobConfig,
    paused: AtomicBool,
    running: AtomicBool,
    /// Newest last
    history: Mutex<VecDeque<RunOutcome>>,
    latest_report: Mutex<Option<ConsistencyReport>>,
}

impl JobState {
    fn new(schedule: JobConfig) -> Self {
        Self {
            schedule,
            paused: AtomicBool::new(false),
            running: AtomicBool::new(false),
            history: Mutex::new(VecDeque::new()),
            latest_report: Mutex::new(None),
        }
    }
}

pub struct JobController {
    orchestrator: Arc<SyncOrchestrator>,
    jobs: HashMap<JobKind, JobState>,
    history_limit: usize,
}

impl JobController {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        schedules: &JobsConfig,
        history_limit: usize,
    ) -> Self {
        let jobs = JobKind::ALL
            .into_iter()
            .map(|kind| {
                let schedule = match kind {
                    JobKind::StockRosterSync => &schedules.stock_roster_sync,
                    JobKind::DailyMetricsSync => &schedules.daily_metrics_sync,
                    JobKind::ProviderLivenessCheck => &schedules.provider_liveness_check,
                };
                (kind, JobState::new(schedule.clone()))
            })
            .collect();
        Self {
            orchestrator,
            jobs,
            history_limit: history_limit.max(1),
        }
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    fn state(&self, job_id: &str) -> Result<(JobKind, &JobState)> {
        JobKind::from_id(job_id)
            .and_then(|kind| self.jobs.get(&kind).map(|state| (kind, state)))
            .ok_or_else(|| Error::UnknownJob(job_id.to_string()))
    }

    /// Run a job now, regardless of its schedule or pause flag.
    pub async fn trigger(&self, job_id: &str) -> Result<RunOutcome> {
        let (kind, state) = self.state(job_id)?;
        info!("Manual trigger of job '{}'", kind);
        Ok(self.run(kind, state).await)
    }

    /// Stop scheduled runs of a job. Manual triggers still run.
    pub fn pause(&self, job_id: &str) -> Result<()> {
        let (kind, state) = self.state(job_id)?;
        state.paused.store(true, Ordering::SeqCst);
        info!("Job '{}' paused", kind);
        Ok(())
    }

    pub fn resume(&self, job_id: &str) -> Result<()> {
        let (kind, state) = self.state(job_id)?;
        state.paused.store(false, Ordering::SeqCst);
        info!("Job '{}' resumed", kind);
        Ok(())
    }

    /// Up to `limit` most recent outcomes, newest first.
    pub fn history(&self, job_id: &str, limit: usize) -> Result<Vec<RunOutcome>> {
        let (_, state) = self.state(job_id)?;
        let history = lock(&state.history, "history");
        Ok(history.iter().rev().take(limit).cloned().collect())
    }

    /// The consistency report of the job's most recent reconciled run.
    pub fn latest_consistency_report(&self, job_id: &str) -> Result<Option<ConsistencyReport>> {
        let (_, state) = self.state(job_id)?;
        Ok(lock(&state.latest_report, "report").clone())
    }

    pub fn jobs(&self) -> Vec<JobStatus> {
        JobKind::ALL
            .into_iter()
            .filter_map(|kind| self.jobs.get(&kind).map(|state| (kind, state)))
            .map(|(kind, state)| JobStatus {
                job_id: kind.id().to_string(),
                enabled: state.schedule.enabled,
                paused: state.paused.load(Ordering::SeqCst),
                running: state.running.load(Ordering::SeqCst),
                interval: state.schedule.interval(),
                last_outcome: lock(&state.history, "history").back().cloned(),
            })
            .collect()
    }

    /// Spawn one interval loop per enabled job.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        JobKind::ALL
            .into_iter()
            .filter(|kind| self.jobs.get(kind).is_some_and(|s| s.schedule.enabled))
            .map(|kind| {
                let controller = Arc::clone(self);
                tokio::spawn(async move { controller.schedule_loop(kind).await })
            })
            .collect()
    }

    async fn schedule_loop(&self, kind: JobKind) {
        let Some(state) = self.jobs.get(&kind) else {
            return;
        };
        let schedule = &state.schedule;
        info!(
            "Job '{}' scheduled every {:?} after {:?}",
            kind,
            schedule.interval(),
            schedule.initial_delay()
        );
        tokio::time::sleep(schedule.initial_delay()).await;

        // First tick is immediate; a zero period would panic
        let mut ticks = interval(schedule.interval().max(Duration::from_secs(1)));
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticks.tick().await;
            if state.paused.load(Ordering::SeqCst) {
                debug!("Job '{}' paused, skipping scheduled run", kind);
                continue;
            }
            self.run(kind, state).await;
        }
    }

    async fn run(&self, kind: JobKind, state: &JobState) -> RunOutcome {
        let Some(_guard) = RunningGuard::acquire(&state.running) else {
            info!("Job '{}' already running, skipping", kind);
            let outcome = RunOutcome::skipped(kind);
            self.remember(state, outcome.clone());
            return outcome;
        };

        let started_at = Utc::now();
        let report = match kind {
            JobKind::StockRosterSync => self.orchestrator.sync_stock_roster().await,
            JobKind::DailyMetricsSync => self.orchestrator.sync_daily_metrics(None).await,
            JobKind::ProviderLivenessCheck => self.orchestrator.check_provider_liveness().await,
        };
        if let Some(consistency) = &report.consistency {
            *lock(&state.latest_report, "report") = Some(consistency.clone());
        }

        let outcome = RunOutcome::from_report(kind, started_at, &report);
        self.save_status(&outcome).await;
        self.remember(state, outcome.clone());
        outcome
    }

    fn remember(&self, state: &JobState, outcome: RunOutcome) {
        let mut history = lock(&state.history, "history");
        history.push_back(outcome);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    async fn save_status(&self, outcome: &RunOutcome) {
        let document = match serde_json::to_value(outcome) {
            Ok(document) => document,
            Err(e) => {
                warn!("Failed to serialize outcome of '{}': {}", outcome.job_id, e);
                return;
            }
        };
        if let Err(e) = self
            .orchestrator
            .store()
            .upsert(SYNC_STATUS_COLLECTION, &outcome.job_id, document)
            .await
        {
            warn!("Failed to save status of '{}': {}", outcome.job_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::store::{DocumentStore, MemoryStore};
    use crate::sync::RunStatus;
    use crate::test_support::{orchestrator, MockSource, Mode};

    fn source() -> Arc<MockSource> {
        Arc::new(
            MockSource::new("TUSHARE", 1)
                .with_stocks(&["000001", "600000"])
                .with_metrics(&[("000001", dec!(5.2), dec!(2200))]),
        )
    }

    fn controller(
        source: Arc<MockSource>,
        schedules: &JobsConfig,
        history_limit: usize,
    ) -> (Arc<JobController>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let sync = orchestrator(&[source], store.clone());
        (
            Arc::new(JobController::new(Arc::new(sync), schedules, history_limit)),
            store,
        )
    }

    fn only_roster_every(secs: u64) -> JobsConfig {
        let mut schedules = JobsConfig::default();
        schedules.stock_roster_sync = JobConfig::every(secs, 0);
        schedules.daily_metrics_sync.enabled = false;
        schedules.provider_liveness_check.enabled = false;
        schedules
    }

    #[tokio::test]
    async fn test_trigger_records_history_and_status() {
        let (jobs, store) = controller(source(), &JobsConfig::default(), 50);

        let outcome = jobs.trigger("stock_roster_sync").await.unwrap();

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.stats.inserted, 2);
        assert_eq!(jobs.history("stock_roster_sync", 10).unwrap(), vec![outcome.clone()]);
        let saved = store
            .get(SYNC_STATUS_COLLECTION, "stock_roster_sync")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved["status"], "success");
        assert_eq!(saved["id"], outcome.id.to_string());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (jobs, _) = controller(source(), &JobsConfig::default(), 50);

        assert!(matches!(
            jobs.trigger("quote_sync").await,
            Err(Error::UnknownJob(id)) if id == "quote_sync"
        ));
        assert!(jobs.pause("quote_sync").is_err());
        assert!(jobs.history("quote_sync", 5).is_err());
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_newest_first() {
        let (jobs, _) = controller(source(), &JobsConfig::default(), 3);

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(jobs.trigger("provider_liveness_check").await.unwrap().id);
        }

        let history = jobs.history("provider_liveness_check", 10).unwrap();
        let seen: Vec<_> = history.iter().map(|o| o.id).collect();
        assert_eq!(seen, vec![ids[4], ids[3], ids[2]]);
        assert_eq!(jobs.history("provider_liveness_check", 1).unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_while_running_is_skipped() {
        let slow = source();
        slow.set_mode(Mode::Slow(Duration::from_secs(2)));
        let (jobs, _) = controller(slow, &JobsConfig::default(), 50);

        let background = {
            let jobs = jobs.clone();
            tokio::spawn(async move { jobs.trigger("stock_roster_sync").await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;

        let second = jobs.trigger("stock_roster_sync").await.unwrap();
        assert_eq!(second.status, RunStatus::Skipped);

        let first = background.await.unwrap().unwrap();
        assert_eq!(first.status, RunStatus::Success);
        let statuses: Vec<_> = jobs
            .history("stock_roster_sync", 10)
            .unwrap()
            .iter()
            .map(|o| o.status)
            .collect();
        assert_eq!(statuses, vec![RunStatus::Success, RunStatus::Skipped]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_runs_follow_interval() {
        let (jobs, _) = controller(source(), &only_roster_every(60), 50);

        let handles = jobs.start();
        assert_eq!(handles.len(), 1);
        tokio::time::sleep(Duration::from_secs(150)).await;

        assert_eq!(jobs.history("stock_roster_sync", 10).unwrap().len(), 3);
        assert!(jobs.history("daily_metrics_sync", 10).unwrap().is_empty());
        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_skips_scheduled_runs_until_resumed() {
        let (jobs, _) = controller(source(), &only_roster_every(60), 50);
        jobs.pause("stock_roster_sync").unwrap();

        let handles = jobs.start();
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert!(jobs.history("stock_roster_sync", 10).unwrap().is_empty());

        let status = &jobs.jobs()[0];
        assert!(status.paused);

        // Manual trigger ignores the pause flag
        jobs.trigger("stock_roster_sync").await.unwrap();
        assert_eq!(jobs.history("stock_roster_sync", 10).unwrap().len(), 1);

        jobs.resume("stock_roster_sync").unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(jobs.history("stock_roster_sync", 10).unwrap().len(), 2);
        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_latest_consistency_report_is_kept() {
        let primary = source();
        let secondary = Arc::new(
            MockSource::new("EASTMONEY", 2).with_metrics(&[("000001", dec!(5.21), dec!(2201))]),
        );
        let store = Arc::new(MemoryStore::new());
        let sync = orchestrator(&[primary, secondary], store);
        let jobs = JobController::new(Arc::new(sync), &JobsConfig::default(), 50);

        assert!(jobs
            .latest_consistency_report("daily_metrics_sync")
            .unwrap()
            .is_none());
        let outcome = jobs.trigger("daily_metrics_sync").await.unwrap();

        let report = jobs
            .latest_consistency_report("daily_metrics_sync")
            .unwrap()
            .unwrap();
        assert!(report.is_consistent);
        assert_eq!(report.secondary_source, "EASTMONEY");
        assert!(outcome.consistency.unwrap().is_consistent);
    }
}
