//! Mock providers and stores shared by the sync and job tests.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;

use marketsync_market_data::{
    ConsistencyChecker, MarketDataError, MarketDataProvider, MetricField, MetricRecord,
    MetricsResult, ProviderCapabilities, ProviderRegistry, QueryKind, RateLimit,
    RateLimiterRegistry, RosterResult, StockInfo,
};

use crate::errors::StoreError;
use crate::store::{DocumentFilter, DocumentStore, MemoryStore, UpsertOutcome};
use crate::sync::SyncOrchestrator;

pub(crate) fn trade_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 7).unwrap()
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Mode {
    Ok,
    Unavailable,
    Fail,
    /// Answers after the given delay
    Slow(Duration),
}

/// Provider serving fixed rows.
pub(crate) struct MockSource {
    id: &'static str,
    priority: u8,
    stocks: Vec<StockInfo>,
    metrics: Vec<MetricRecord>,
    mode: Mutex<Mode>,
    calls: AtomicUsize,
}

impl MockSource {
    pub(crate) fn new(id: &'static str, priority: u8) -> Self {
        Self {
            id,
            priority,
            stocks: Vec::new(),
            metrics: Vec::new(),
            mode: Mutex::new(Mode::Ok),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_stocks(mut self, codes: &[&str]) -> Self {
        self.stocks = codes
            .iter()
            .filter_map(|code| StockInfo::from_raw(code, format!("Stock {}", code)))
            .collect();
        self
    }

    /// One record per `(code, pe, total_mv)`.
    pub(crate) fn with_metrics(mut self, rows: &[(&str, Decimal, Decimal)]) -> Self {
        self.metrics = rows
            .iter()
            .map(|(code, pe, mv)| {
                MetricRecord::new(*code)
                    .with(MetricField::Pe, *pe)
                    .with(MetricField::TotalMv, *mv)
            })
            .collect();
        self
    }

    pub(crate) fn with_mode(self, mode: Mode) -> Self {
        self.set_mode(mode);
        self
    }

    pub(crate) fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond<T>(&self, data: T) -> Result<T, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        match mode {
            Mode::Ok => Ok(data),
            Mode::Unavailable => Err(MarketDataError::ProviderUnavailable {
                provider: self.id.to_string(),
                reason: "no token".to_string(),
            }),
            Mode::Fail => Err(MarketDataError::ProviderError {
                provider: self.id.to_string(),
                message: "HTTP 500".to_string(),
            }),
            Mode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(data)
            }
        }
    }
}

#[async_trait]
impl MarketDataProvider for MockSource {
    fn id(&self) -> &'static str {
        self.id
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            query_kinds: &[
                QueryKind::StockList,
                QueryKind::DailyMetrics,
                QueryKind::LatestTradeDate,
            ],
            historical_metrics: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::default()
    }

    fn is_available(&self) -> bool {
        !matches!(*self.mode.lock().unwrap(), Mode::Unavailable)
    }

    async fn get_stock_list(&self) -> Result<RosterResult, MarketDataError> {
        let mut roster = RosterResult::new(Cow::Borrowed(self.id), trade_date());
        for stock in &self.stocks {
            roster.insert(stock.clone());
        }
        self.respond(roster).await
    }

    async fn get_daily_metrics(&self, date: NaiveDate) -> Result<MetricsResult, MarketDataError> {
        let mut metrics = MetricsResult::new(Cow::Borrowed(self.id), date);
        for record in &self.metrics {
            metrics.insert(record.clone());
        }
        self.respond(metrics).await
    }

    async fn get_latest_trade_date(&self, _probe_days: u32) -> Result<NaiveDate, MarketDataError> {
        self.respond(trade_date()).await
    }
}

/// Memory store that refuses writes to chosen keys.
#[derive(Default)]
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    failing_keys: HashSet<String>,
}

impl FlakyStore {
    pub(crate) fn failing(keys: &[&str]) -> Self {
        Self {
            inner: MemoryStore::new(),
            failing_keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn upsert(
        &self,
        collection: &str,
        key: &str,
        document: Value,
    ) -> Result<UpsertOutcome, StoreError> {
        if self.failing_keys.contains(key) {
            return Err(StoreError::Backend(format!("disk full writing {}", key)));
        }
        self.inner.upsert(collection, key, document).await
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(collection, key).await
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<usize, StoreError> {
        self.inner.count_documents(collection, filter).await
    }

    async fn find_latest(
        &self,
        collection: &str,
        filter: &DocumentFilter,
        sort_field: &str,
    ) -> Result<Option<Value>, StoreError> {
        self.inner.find_latest(collection, filter, sort_field).await
    }
}

pub(crate) fn registry(sources: &[Arc<MockSource>]) -> Arc<ProviderRegistry> {
    let providers: Vec<Arc<dyn MarketDataProvider>> = sources
        .iter()
        .map(|s| s.clone() as Arc<dyn MarketDataProvider>)
        .collect();
    Arc::new(
        ProviderRegistry::new(providers, Arc::new(RateLimiterRegistry::new()))
            .with_call_timeout(Duration::from_secs(5)),
    )
}

pub(crate) fn orchestrator(
    sources: &[Arc<MockSource>],
    store: Arc<dyn DocumentStore>,
) -> SyncOrchestrator {
    SyncOrchestrator::new(registry(sources), store, ConsistencyChecker::new())
        .with_job_timeout(Duration::from_secs(60))
}
