//! Provider registry for orchestrating market data providers.
//!
//! The registry owns every configured provider and answers logical queries by
//! trying providers in priority order:
//! - Providers lacking the capability for the query are never candidates
//! - Providers reporting `is_available() == false` are skipped, not called
//! - Every call runs under a per-call timeout
//! - Unavailable, empty, timed-out and failed calls fall through to the next
//!   provider, and every transition is logged with its reason
//!
//! Rate limiting happens inside the adapters, which hold a handle to their
//! limiter from the shared [`RateLimiterRegistry`].

use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;

use super::diagnostics::FetchDiagnostics;
use super::rate_limiter::{RateLimiterRegistry, RateLimiterStats};
use crate::errors::MarketDataError;
use crate::models::{MetricsResult, ProviderId, QueryResult, QuoteResult, RosterResult};
use crate::provider::{MarketDataProvider, QueryKind, DEFAULT_PROBE_DAYS};

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything a provider call can return, sized for the emptiness check.
pub trait FetchOutput {
    fn row_count(&self) -> usize;
}

impl<T> FetchOutput for QueryResult<T> {
    fn row_count(&self) -> usize {
        self.len()
    }
}

impl FetchOutput for NaiveDate {
    fn row_count(&self) -> usize {
        1
    }
}

/// Successful fetch plus the record of every provider considered.
#[derive(Clone, Debug)]
pub struct Fetched<T> {
    pub data: T,
    pub diagnostics: FetchDiagnostics,
}

/// Result of a consistency-checked metrics fetch.
///
/// `secondary` is the next provider's answer for the same query, or `None`
/// when that single extra attempt failed or no further provider exists.
#[derive(Clone, Debug)]
pub struct CheckedFetch {
    pub primary: MetricsResult,
    pub secondary: Option<MetricsResult>,
    pub diagnostics: FetchDiagnostics,
}

/// Registry-side view of one provider.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub name: ProviderId,
    /// Effective priority (custom override or the provider's own)
    pub priority: i32,
    pub capabilities: Vec<QueryKind>,
    pub historical_metrics: bool,
    pub available: bool,
}

/// Result of probing one provider for liveness.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub provider: ProviderDescriptor,
    pub latest_trade_date: Option<NaiveDate>,
    pub error: Option<String>,
}

impl ProviderHealth {
    pub fn is_healthy(&self) -> bool {
        self.provider.available && self.error.is_none()
    }
}

/// Provider registry for orchestrating market data fetching.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    limiters: Arc<RateLimiterRegistry>,
    /// User-configured priorities (provider_id -> priority).
    /// Lower values = higher priority. If not set, falls back to provider's default priority.
    custom_priorities: HashMap<String, i32>,
    call_timeout: Duration,
    probe_days: u32,
}

impl ProviderRegistry {
    /// Create a new provider registry.
    ///
    /// # Arguments
    ///
    /// * `providers` - Every configured provider, enabled or not
    /// * `limiters` - The limiter registry the providers' handles came from
    pub fn new(
        providers: Vec<Arc<dyn MarketDataProvider>>,
        limiters: Arc<RateLimiterRegistry>,
    ) -> Self {
        Self::with_priorities(providers, limiters, HashMap::new())
    }

    /// Create a new provider registry with custom priorities.
    ///
    /// # Arguments
    ///
    /// * `providers` - Every configured provider, enabled or not
    /// * `limiters` - The limiter registry the providers' handles came from
    /// * `custom_priorities` - User-configured priorities (provider_id -> priority).
    ///   Lower values = higher priority.
    pub fn with_priorities(
        providers: Vec<Arc<dyn MarketDataProvider>>,
        limiters: Arc<RateLimiterRegistry>,
        custom_priorities: HashMap<String, i32>,
    ) -> Self {
        Self {
            providers,
            limiters,
            custom_priorities,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            probe_days: DEFAULT_PROBE_DAYS,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Number of days the latest-trade-date probe walks back.
    pub fn with_probe_days(mut self, probe_days: u32) -> Self {
        self.probe_days = probe_days;
        self
    }

    /// Get the list of registered providers.
    pub fn providers(&self) -> &[Arc<dyn MarketDataProvider>] {
        &self.providers
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Fetch the instrument roster from the first provider that has one.
    pub async fn fetch_stock_list(
        &self,
        preferred: &[String],
    ) -> Result<Fetched<RosterResult>, MarketDataError> {
        self.fetch_first(QueryKind::StockList, preferred, |p| async move {
            p.get_stock_list().await
        })
        .await
    }

    /// Fetch daily metrics for `date` from the first provider that has them.
    pub async fn fetch_daily_metrics(
        &self,
        date: NaiveDate,
        preferred: &[String],
    ) -> Result<Fetched<MetricsResult>, MarketDataError> {
        self.fetch_first(QueryKind::DailyMetrics, preferred, move |p| async move {
            p.get_daily_metrics(date).await
        })
        .await
    }

    /// Find the latest trade date from the first provider that can tell.
    pub async fn find_latest_trade_date(
        &self,
        preferred: &[String],
    ) -> Result<Fetched<NaiveDate>, MarketDataError> {
        let probe_days = self.probe_days;
        self.fetch_first(QueryKind::LatestTradeDate, preferred, move |p| async move {
            p.get_latest_trade_date(probe_days).await
        })
        .await
    }

    /// Fetch the intraday quote snapshot from the first provider that has one.
    pub async fn fetch_realtime_quotes(
        &self,
        preferred: &[String],
    ) -> Result<Fetched<QuoteResult>, MarketDataError> {
        self.fetch_first(QueryKind::RealtimeQuotes, preferred, |p| async move {
            p.get_realtime_quotes().await
        })
        .await
    }

    /// Fetch daily metrics, then ask exactly one more provider for the same
    /// date so the two answers can be compared.
    ///
    /// The extra attempt goes to the next provider in order after the one
    /// that succeeded; unavailable providers on the way are skipped without a
    /// call. Its failure never fails the fetch.
    pub async fn fetch_daily_metrics_checked(
        &self,
        date: NaiveDate,
        preferred: &[String],
    ) -> Result<CheckedFetch, MarketDataError> {
        let kind = QueryKind::DailyMetrics;
        let providers = self.ordered_providers(kind, preferred);
        if providers.is_empty() {
            return Err(MarketDataError::NoProvidersAvailable(kind.to_string()));
        }

        let call = move |p: Arc<dyn MarketDataProvider>| async move {
            p.get_daily_metrics(date).await
        };

        let mut diagnostics = FetchDiagnostics::new();
        let Some((index, primary)) = self
            .try_in_order(kind, &providers, &mut diagnostics, &call)
            .await
        else {
            warn!("{}: all providers failed. Diagnostics: {}", kind, diagnostics.summary());
            return Err(MarketDataError::AllProvidersFailed {
                failures: diagnostics.failures(),
            });
        };

        let mut secondary = None;
        for provider in &providers[index + 1..] {
            let provider_id: ProviderId = Cow::Borrowed(provider.id());
            if !provider.is_available() {
                debug!("{}: secondary '{}' unavailable, skipping", kind, provider_id);
                diagnostics.record_skip(provider_id);
                continue;
            }
            secondary = self
                .call_provider(kind, provider, &mut diagnostics, &call)
                .await
                .ok();
            if secondary.is_none() {
                info!(
                    "{}: secondary '{}' failed, continuing with '{}' alone",
                    kind, provider_id, primary.source
                );
            }
            break;
        }

        info!("{}: {}", kind, diagnostics.summary());
        Ok(CheckedFetch {
            primary,
            secondary,
            diagnostics,
        })
    }

    /// Descriptor of every provider, ordered by effective priority.
    pub fn provider_status(&self) -> Vec<ProviderDescriptor> {
        let mut providers: Vec<_> = self.providers.iter().collect();
        providers.sort_by_key(|p| self.effective_priority(p.as_ref()));
        providers
            .into_iter()
            .map(|p| self.describe(p.as_ref()))
            .collect()
    }

    /// Probe every provider: availability, and the latest trade date where
    /// the provider can report one.
    pub async fn check_liveness(&self) -> Vec<ProviderHealth> {
        let mut report = Vec::with_capacity(self.providers.len());
        let mut providers: Vec<_> = self.providers.iter().collect();
        providers.sort_by_key(|p| self.effective_priority(p.as_ref()));

        for provider in providers {
            let descriptor = self.describe(provider.as_ref());
            let (latest_trade_date, error) = if !descriptor.available {
                (None, Some("disabled or missing credentials".to_string()))
            } else if !provider.capabilities().supports(QueryKind::LatestTradeDate) {
                (None, None)
            } else {
                match tokio::time::timeout(
                    self.call_timeout,
                    provider.get_latest_trade_date(self.probe_days),
                )
                .await
                {
                    Ok(Ok(date)) => (Some(date), None),
                    Ok(Err(e)) => (None, Some(e.to_string())),
                    Err(_) => (None, Some(format!("timed out after {:?}", self.call_timeout))),
                }
            };

            if let Some(error) = &error {
                warn!("Liveness: provider '{}' unhealthy: {}", descriptor.name, error);
            }
            report.push(ProviderHealth {
                provider: descriptor,
                latest_trade_date,
                error,
            });
        }
        report
    }

    /// Stats of every provider's rate limiter.
    pub fn rate_limiter_stats(&self) -> Vec<RateLimiterStats> {
        self.limiters.stats()
    }

    pub fn reset_rate_limiter_stats(&self) {
        self.limiters.reset_stats();
    }

    async fn fetch_first<T, F, Fut>(
        &self,
        kind: QueryKind,
        preferred: &[String],
        call: F,
    ) -> Result<Fetched<T>, MarketDataError>
    where
        T: FetchOutput,
        F: Fn(Arc<dyn MarketDataProvider>) -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>>,
    {
        let providers = self.ordered_providers(kind, preferred);
        if providers.is_empty() {
            warn!("No providers support {}", kind);
            return Err(MarketDataError::NoProvidersAvailable(kind.to_string()));
        }

        let mut diagnostics = FetchDiagnostics::new();
        match self
            .try_in_order(kind, &providers, &mut diagnostics, &call)
            .await
        {
            Some((_, data)) => {
                info!("{}: {}", kind, diagnostics.summary());
                Ok(Fetched { data, diagnostics })
            }
            None => {
                warn!("{}: all providers failed. Diagnostics: {}", kind, diagnostics.summary());
                Err(MarketDataError::AllProvidersFailed {
                    failures: diagnostics.failures(),
                })
            }
        }
    }

    /// Try `providers` in order until one returns non-empty data.
    ///
    /// Returns the index of the provider that succeeded alongside its data.
    async fn try_in_order<T, F, Fut>(
        &self,
        kind: QueryKind,
        providers: &[Arc<dyn MarketDataProvider>],
        diagnostics: &mut FetchDiagnostics,
        call: &F,
    ) -> Option<(usize, T)>
    where
        T: FetchOutput,
        F: Fn(Arc<dyn MarketDataProvider>) -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>>,
    {
        for (index, provider) in providers.iter().enumerate() {
            let provider_id: ProviderId = Cow::Borrowed(provider.id());

            if !provider.is_available() {
                warn!(
                    "{}: provider '{}' unavailable (disabled or missing credentials), falling back",
                    kind, provider_id
                );
                diagnostics.record_skip(provider_id);
                continue;
            }

            if let Ok(data) = self.call_provider(kind, provider, diagnostics, call).await {
                return Some((index, data));
            }
        }
        None
    }

    /// One timed call to one provider, recorded in `diagnostics`.
    async fn call_provider<T, F, Fut>(
        &self,
        kind: QueryKind,
        provider: &Arc<dyn MarketDataProvider>,
        diagnostics: &mut FetchDiagnostics,
        call: &F,
    ) -> Result<T, MarketDataError>
    where
        T: FetchOutput,
        F: Fn(Arc<dyn MarketDataProvider>) -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>>,
    {
        let provider_id: ProviderId = Cow::Borrowed(provider.id());
        debug!("{}: calling provider '{}'", kind, provider_id);

        let outcome = match tokio::time::timeout(self.call_timeout, call(provider.clone())).await {
            Ok(Ok(data)) if data.row_count() == 0 => Err(MarketDataError::no_data(
                provider.id(),
                format!("empty {} result", kind),
            )),
            Ok(result) => result,
            Err(_) => Err(MarketDataError::Timeout {
                provider: provider_id.to_string(),
            }),
        };

        match outcome {
            Ok(data) => {
                diagnostics.record_success(provider_id, data.row_count());
                Ok(data)
            }
            Err(e) => {
                let failure_kind = e.failure_kind();
                warn!(
                    "{}: provider '{}' failed ({}): {}, falling back",
                    kind, provider_id, failure_kind, e
                );
                diagnostics.record_failure(provider_id, failure_kind, e.to_string());
                Err(e)
            }
        }
    }

    /// Candidates for `kind`, ordered by preference.
    ///
    /// Priority order:
    /// 1. Caller-preferred providers, in the caller's order
    /// 2. Custom user priorities (from settings) if configured
    /// 3. Provider's default priority as fallback
    fn ordered_providers(
        &self,
        kind: QueryKind,
        preferred: &[String],
    ) -> Vec<Arc<dyn MarketDataProvider>> {
        let mut providers: Vec<_> = self
            .providers
            .iter()
            .filter(|p| p.capabilities().supports(kind))
            .cloned()
            .collect();

        providers.sort_by_key(|p| {
            match preferred.iter().position(|name| name.as_str() == p.id()) {
                Some(rank) => (0, rank as i32),
                None => (1, self.effective_priority(p.as_ref())),
            }
        });
        providers
    }

    fn effective_priority(&self, provider: &dyn MarketDataProvider) -> i32 {
        self.custom_priorities
            .get(provider.id())
            .copied()
            .unwrap_or_else(|| i32::from(provider.priority()))
    }

    fn describe(&self, provider: &dyn MarketDataProvider) -> ProviderDescriptor {
        let capabilities = provider.capabilities();
        ProviderDescriptor {
            name: Cow::Borrowed(provider.id()),
            priority: self.effective_priority(provider),
            capabilities: capabilities.query_kinds.to_vec(),
            historical_metrics: capabilities.historical_metrics,
            available: provider.is_available(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use crate::models::{MetricField, MetricRecord, RealtimeQuote, StockInfo};
    use crate::provider::{ProviderCapabilities, RateLimit};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Behavior {
        Ok,
        Unavailable,
        Empty,
        Fail,
        Hang,
    }

    struct MockProvider {
        id: &'static str,
        priority: u8,
        behavior: Behavior,
        call_count: AtomicUsize,
    }

    impl MockProvider {
        fn new(id: &'static str, priority: u8, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                id,
                priority,
                behavior,
                call_count: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        async fn respond<T>(&self, data: T) -> Result<T, MarketDataError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Ok | Behavior::Empty => Ok(data),
                Behavior::Unavailable => Err(MarketDataError::unavailable(self.id, "no token")),
                Behavior::Fail => Err(MarketDataError::provider(self.id, "HTTP 500")),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(data)
                }
            }
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 7).unwrap()
    }

    #[async_trait::async_trait]
    impl MarketDataProvider for MockProvider {
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
                    QueryKind::RealtimeQuotes,
                ],
                historical_metrics: true,
            }
        }

        fn rate_limit(&self) -> RateLimit {
            RateLimit::default()
        }

        fn is_available(&self) -> bool {
            !matches!(self.behavior, Behavior::Unavailable)
        }

        async fn get_realtime_quotes(&self) -> Result<QuoteResult, MarketDataError> {
            let mut quotes = QuoteResult::new(Cow::Borrowed(self.id), day());
            if !matches!(self.behavior, Behavior::Empty) {
                let mut quote = RealtimeQuote::new("000001");
                quote.price = Some(dec!(10.5));
                quotes.insert(quote);
            }
            self.respond(quotes).await
        }

        async fn get_stock_list(&self) -> Result<RosterResult, MarketDataError> {
            let mut roster = RosterResult::new(Cow::Borrowed(self.id), day());
            if !matches!(self.behavior, Behavior::Empty) {
                roster.insert(StockInfo::from_raw("000001", "Ping An Bank").unwrap());
            }
            self.respond(roster).await
        }

        async fn get_daily_metrics(
            &self,
            date: NaiveDate,
        ) -> Result<MetricsResult, MarketDataError> {
            let mut metrics = MetricsResult::new(Cow::Borrowed(self.id), date);
            if !matches!(self.behavior, Behavior::Empty) {
                metrics.insert(MetricRecord::new("000001").with(MetricField::Pe, dec!(10)));
            }
            self.respond(metrics).await
        }

        async fn get_latest_trade_date(
            &self,
            _probe_days: u32,
        ) -> Result<NaiveDate, MarketDataError> {
            self.respond(day()).await
        }
    }

    /// Registry over clones of the mocks, so tests can still read call counts.
    fn registry(providers: &[Arc<MockProvider>]) -> ProviderRegistry {
        let providers: Vec<Arc<dyn MarketDataProvider>> = providers
            .iter()
            .map(|p| p.clone() as Arc<dyn MarketDataProvider>)
            .collect();
        ProviderRegistry::new(providers, Arc::new(RateLimiterRegistry::new()))
    }

    fn ids(providers: &[Arc<dyn MarketDataProvider>]) -> Vec<&'static str> {
        providers.iter().map(|p| p.id()).collect()
    }

    #[test]
    fn test_provider_ordering_by_priority() {
        let registry = registry(&[
            MockProvider::new("LOW_PRIORITY", 20, Behavior::Ok),
            MockProvider::new("HIGH_PRIORITY", 5, Behavior::Ok),
            MockProvider::new("MED_PRIORITY", 10, Behavior::Ok),
        ]);

        let ordered = registry.ordered_providers(QueryKind::StockList, &[]);
        assert_eq!(ids(&ordered), vec!["HIGH_PRIORITY", "MED_PRIORITY", "LOW_PRIORITY"]);
    }

    #[test]
    fn test_preferred_providers_first_in_caller_order() {
        let registry = registry(&[
            MockProvider::new("PROVIDER_A", 5, Behavior::Ok),
            MockProvider::new("PROVIDER_B", 10, Behavior::Ok),
            MockProvider::new("PROVIDER_C", 15, Behavior::Ok),
        ]);

        let preferred = vec!["PROVIDER_C".to_string(), "PROVIDER_B".to_string()];
        let ordered = registry.ordered_providers(QueryKind::StockList, &preferred);
        assert_eq!(ids(&ordered), vec!["PROVIDER_C", "PROVIDER_B", "PROVIDER_A"]);

        // The preference applies to that call only
        let ordered = registry.ordered_providers(QueryKind::StockList, &[]);
        assert_eq!(ids(&ordered), vec!["PROVIDER_A", "PROVIDER_B", "PROVIDER_C"]);
    }

    #[test]
    fn test_custom_priorities_override_defaults() {
        let providers: Vec<Arc<dyn MarketDataProvider>> = vec![
            MockProvider::new("PROVIDER_A", 5, Behavior::Ok),
            MockProvider::new("PROVIDER_B", 10, Behavior::Ok),
            MockProvider::new("PROVIDER_C", 15, Behavior::Ok),
        ];
        let mut custom_priorities = HashMap::new();
        custom_priorities.insert("PROVIDER_C".to_string(), 1);
        custom_priorities.insert("PROVIDER_A".to_string(), 50);

        let registry = ProviderRegistry::with_priorities(
            providers,
            Arc::new(RateLimiterRegistry::new()),
            custom_priorities,
        );

        let ordered = registry.ordered_providers(QueryKind::StockList, &[]);
        assert_eq!(ids(&ordered), vec!["PROVIDER_C", "PROVIDER_B", "PROVIDER_A"]);

        let status = registry.provider_status();
        assert_eq!(status[0].name, "PROVIDER_C");
        assert_eq!(status[0].priority, 1);
    }

    #[tokio::test]
    async fn test_unavailable_provider_falls_back() {
        let a = MockProvider::new("A", 1, Behavior::Unavailable);
        let b = MockProvider::new("B", 2, Behavior::Ok);
        let registry = registry(&[a.clone(), b.clone()]);

        let fetched = registry.fetch_stock_list(&[]).await.unwrap();
        assert_eq!(fetched.data.source, "B");
        assert_eq!(fetched.data.len(), 1);

        let failures = fetched.diagnostics.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].provider, "A");
        assert_eq!(failures[0].kind, FailureKind::Unavailable);
        assert_eq!(a.calls(), 0);
        assert_eq!(fetched.diagnostics.summary(), "A: SKIPPED -> B: SUCCESS");
    }

    #[tokio::test]
    async fn test_exhaustion_lists_every_provider_once() {
        let providers = [
            MockProvider::new("A", 1, Behavior::Unavailable),
            MockProvider::new("B", 2, Behavior::Empty),
            MockProvider::new("C", 3, Behavior::Fail),
        ];
        let registry = registry(&providers);

        let err = registry
            .fetch_daily_metrics(day(), &[])
            .await
            .unwrap_err();
        let failures = err.provider_failures();
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[0].kind, FailureKind::Unavailable);
        assert_eq!(failures[1].kind, FailureKind::Empty);
        assert_eq!(failures[2].kind, FailureKind::Error);

        assert_eq!(providers[0].calls(), 0);
        assert_eq!(providers[1].calls(), 1);
        assert_eq!(providers[2].calls(), 1);
    }

    #[tokio::test]
    async fn test_no_capable_provider() {
        struct RosterOnly;

        #[async_trait::async_trait]
        impl MarketDataProvider for RosterOnly {
            fn id(&self) -> &'static str {
                "ROSTER_ONLY"
            }

            fn capabilities(&self) -> ProviderCapabilities {
                ProviderCapabilities {
                    query_kinds: &[QueryKind::StockList],
                    historical_metrics: false,
                }
            }

            fn rate_limit(&self) -> RateLimit {
                RateLimit::default()
            }

            fn is_available(&self) -> bool {
                true
            }
        }

        let registry = ProviderRegistry::new(
            vec![Arc::new(RosterOnly)],
            Arc::new(RateLimiterRegistry::new()),
        );
        let err = registry
            .fetch_daily_metrics(day(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, MarketDataError::NoProvidersAvailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_fallback() {
        let a = MockProvider::new("A", 1, Behavior::Hang);
        let b = MockProvider::new("B", 2, Behavior::Ok);
        let registry = registry(&[a, b]).with_call_timeout(Duration::from_secs(5));

        let fetched = registry.find_latest_trade_date(&[]).await.unwrap();
        assert_eq!(fetched.data, day());
        let failures = fetched.diagnostics.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_realtime_quotes_fall_back_past_empty_and_failed() {
        let providers = [
            MockProvider::new("A", 1, Behavior::Empty),
            MockProvider::new("B", 2, Behavior::Fail),
            MockProvider::new("C", 3, Behavior::Ok),
        ];
        let registry = registry(&providers);

        let fetched = registry.fetch_realtime_quotes(&[]).await.unwrap();
        assert_eq!(fetched.data.source, "C");
        assert_eq!(fetched.data.rows["000001"].price, Some(dec!(10.5)));
        assert_eq!(
            fetched.diagnostics.summary(),
            "A: FAILED (empty) -> B: FAILED (error) -> C: SUCCESS"
        );
    }

    #[tokio::test]
    async fn test_realtime_quotes_skip_providers_without_the_capability() {
        struct RosterOnly;

        #[async_trait::async_trait]
        impl MarketDataProvider for RosterOnly {
            fn id(&self) -> &'static str {
                "ROSTER_ONLY"
            }

            fn priority(&self) -> u8 {
                0
            }

            fn capabilities(&self) -> ProviderCapabilities {
                ProviderCapabilities {
                    query_kinds: &[QueryKind::StockList],
                    historical_metrics: false,
                }
            }

            fn rate_limit(&self) -> RateLimit {
                RateLimit::default()
            }

            fn is_available(&self) -> bool {
                true
            }
        }

        let quoting = MockProvider::new("QUOTES", 5, Behavior::Ok);
        let registry = ProviderRegistry::new(
            vec![Arc::new(RosterOnly), quoting.clone()],
            Arc::new(RateLimiterRegistry::new()),
        );

        let fetched = registry.fetch_realtime_quotes(&[]).await.unwrap();
        assert_eq!(fetched.data.source, "QUOTES");
        assert_eq!(fetched.diagnostics.summary(), "QUOTES: SUCCESS");
    }

    #[tokio::test]
    async fn test_checked_fetch_uses_exactly_one_more_provider() {
        let providers = [
            MockProvider::new("A", 1, Behavior::Ok),
            MockProvider::new("B", 2, Behavior::Ok),
            MockProvider::new("C", 3, Behavior::Ok),
        ];
        let registry = registry(&providers);

        let checked = registry
            .fetch_daily_metrics_checked(day(), &[])
            .await
            .unwrap();
        assert_eq!(checked.primary.source, "A");
        assert_eq!(checked.secondary.unwrap().source, "B");
        assert_eq!(providers[2].calls(), 0);
    }

    #[tokio::test]
    async fn test_checked_fetch_secondary_failure_keeps_primary() {
        let providers = [
            MockProvider::new("A", 1, Behavior::Fail),
            MockProvider::new("B", 2, Behavior::Ok),
            MockProvider::new("C", 3, Behavior::Unavailable),
            MockProvider::new("D", 4, Behavior::Empty),
            MockProvider::new("E", 5, Behavior::Ok),
        ];
        let registry = registry(&providers);

        let checked = registry
            .fetch_daily_metrics_checked(day(), &[])
            .await
            .unwrap();
        assert_eq!(checked.primary.source, "B");
        assert!(checked.secondary.is_none());
        assert_eq!(providers[3].calls(), 1);
        assert_eq!(providers[4].calls(), 0);
        assert_eq!(
            checked.diagnostics.summary(),
            "A: FAILED (error) -> B: SUCCESS -> C: SKIPPED -> D: FAILED (empty)"
        );
    }

    #[tokio::test]
    async fn test_checked_fetch_single_provider() {
        let registry = registry(&[MockProvider::new("A", 1, Behavior::Ok)]);
        let checked = registry
            .fetch_daily_metrics_checked(day(), &[])
            .await
            .unwrap();
        assert!(checked.secondary.is_none());
    }

    #[tokio::test]
    async fn test_liveness_reports_each_provider() {
        let registry = registry(&[
            MockProvider::new("A", 1, Behavior::Unavailable),
            MockProvider::new("B", 2, Behavior::Ok),
            MockProvider::new("C", 3, Behavior::Fail),
        ]);

        let health = registry.check_liveness().await;
        assert_eq!(health.len(), 3);
        assert!(!health[0].is_healthy());
        assert!(health[1].is_healthy());
        assert_eq!(health[1].latest_trade_date, Some(day()));
        assert!(!health[2].is_healthy());
    }
}
