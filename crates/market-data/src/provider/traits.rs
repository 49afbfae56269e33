//! Market data provider trait definitions.
//!
//! This module defines the core `MarketDataProvider` trait that all
//! upstream adapters implement, plus the shared backward date probe.

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use chrono_tz::Asia::Shanghai;
use log::debug;

use crate::errors::MarketDataError;
use crate::models::{MetricsResult, QuoteResult, RosterResult};

use super::capabilities::{ProviderCapabilities, RateLimit};

/// Default number of calendar days probed backward for the latest trade date.
pub const DEFAULT_PROBE_DAYS: u32 = 10;

/// Trait for market data providers.
///
/// Implement this trait to add support for a new upstream source.
/// The registry uses the provider's capabilities, availability and priority
/// to decide when to call it. Every method that reaches the upstream must
/// await the provider's rate limiter first.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use marketsync_market_data::provider::{
///     MarketDataProvider, ProviderCapabilities, QueryKind, RateLimit,
/// };
///
/// struct MyProvider;
///
/// #[async_trait]
/// impl MarketDataProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn capabilities(&self) -> ProviderCapabilities {
///         ProviderCapabilities {
///             query_kinds: &[QueryKind::StockList],
///             historical_metrics: false,
///         }
///     }
///
///     fn rate_limit(&self) -> RateLimit {
///         RateLimit::default()
///     }
///
///     fn is_available(&self) -> bool {
///         true
///     }
///
///     // ... implement get_stock_list
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// Should be a constant string like "TUSHARE" or "EASTMONEY".
    /// Used for logging, limiter lookup and result tagging.
    fn id(&self) -> &'static str;

    /// Provider priority for ordering.
    ///
    /// Lower values = higher priority. Default is 10.
    fn priority(&self) -> u8 {
        10
    }

    /// Describes which queries this provider answers.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Upstream quota declared by the provider.
    fn rate_limit(&self) -> RateLimit;

    /// Cheap configuration check (enabled, credentials present).
    ///
    /// Never touches the network and never counts against the rate limit.
    fn is_available(&self) -> bool;

    /// Fetch the full listed-instrument roster.
    ///
    /// Default implementation returns `NotSupported`.
    async fn get_stock_list(&self) -> Result<RosterResult, MarketDataError> {
        Err(MarketDataError::NotSupported {
            operation: "stock_list".to_string(),
            provider: self.id().to_string(),
        })
    }

    /// Fetch valuation metrics for every instrument on `date`.
    ///
    /// Returns `DataUnavailable` when the upstream has nothing for the date,
    /// e.g. a non-trading day. Default implementation returns `NotSupported`.
    async fn get_daily_metrics(&self, date: NaiveDate) -> Result<MetricsResult, MarketDataError> {
        let _ = date;
        Err(MarketDataError::NotSupported {
            operation: "daily_metrics".to_string(),
            provider: self.id().to_string(),
        })
    }

    /// Fetch the latest intraday quote of every instrument.
    ///
    /// Default implementation returns `NotSupported`.
    async fn get_realtime_quotes(&self) -> Result<QuoteResult, MarketDataError> {
        Err(MarketDataError::NotSupported {
            operation: "realtime_quotes".to_string(),
            provider: self.id().to_string(),
        })
    }

    /// Whether the upstream has published data for `date`.
    ///
    /// The default fetches the full metrics table; providers with a cheaper
    /// query should override it.
    async fn probe_trade_date(&self, date: NaiveDate) -> Result<bool, MarketDataError> {
        match self.get_daily_metrics(date).await {
            Ok(result) => Ok(!result.is_empty()),
            Err(e) if e.is_data_unavailable() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Find the most recent date with published data.
    ///
    /// Probes backward from today (Asia/Shanghai) at most `probe_days` days.
    async fn get_latest_trade_date(&self, probe_days: u32) -> Result<NaiveDate, MarketDataError> {
        probe_latest_trade_date(self, market_today(), probe_days).await
    }
}

/// Today's date on the exchange calendar.
pub fn market_today() -> NaiveDate {
    Utc::now().with_timezone(&Shanghai).date_naive()
}

/// Probe backward from `today` until `provider` reports data for a date.
///
/// `ProviderUnavailable` aborts the probe at once; any other per-date error
/// is skipped so one bad day does not hide an earlier good one.
pub async fn probe_latest_trade_date<P>(
    provider: &P,
    today: NaiveDate,
    probe_days: u32,
) -> Result<NaiveDate, MarketDataError>
where
    P: MarketDataProvider + ?Sized,
{
    for offset in 0..probe_days.max(1) {
        let Some(date) = today.checked_sub_days(Days::new(u64::from(offset))) else {
            break;
        };

        match provider.probe_trade_date(date).await {
            Ok(true) => {
                debug!("{}: latest trade date is {}", provider.id(), date);
                return Ok(date);
            }
            Ok(false) => continue,
            Err(e @ MarketDataError::ProviderUnavailable { .. }) => return Err(e),
            Err(e) => {
                debug!("{}: probe for {} failed: {}", provider.id(), date, e);
            }
        }
    }

    Err(MarketDataError::no_data(
        provider.id(),
        format!("no trade date within {} days of {}", probe_days, today),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricRecord, MetricsResult};
    use crate::provider::QueryKind;
    use std::borrow::Cow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider with data only on the listed dates.
    struct CalendarProvider {
        trading_days: Vec<NaiveDate>,
        broken_days: Vec<NaiveDate>,
        unavailable: bool,
        probes: AtomicUsize,
    }

    impl CalendarProvider {
        fn new(trading_days: Vec<NaiveDate>) -> Self {
            Self {
                trading_days,
                broken_days: Vec::new(),
                unavailable: false,
                probes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for CalendarProvider {
        fn id(&self) -> &'static str {
            "CALENDAR"
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities {
                query_kinds: &[QueryKind::DailyMetrics, QueryKind::LatestTradeDate],
                historical_metrics: true,
            }
        }

        fn rate_limit(&self) -> RateLimit {
            RateLimit::default()
        }

        fn is_available(&self) -> bool {
            !self.unavailable
        }

        async fn get_daily_metrics(
            &self,
            date: NaiveDate,
        ) -> Result<MetricsResult, MarketDataError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.unavailable {
                return Err(MarketDataError::unavailable(self.id(), "no token"));
            }
            if self.broken_days.contains(&date) {
                return Err(MarketDataError::provider(self.id(), "HTTP 500"));
            }
            if !self.trading_days.contains(&date) {
                return Err(MarketDataError::no_data(self.id(), "holiday"));
            }
            let mut result = MetricsResult::new(Cow::Borrowed("CALENDAR"), date);
            result.insert(MetricRecord::new("000001"));
            Ok(result)
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[tokio::test]
    async fn test_probe_skips_weekend() {
        // 2024-06-10 is a Monday holiday, 06-07 is the Friday before
        let provider = CalendarProvider::new(vec![day(6), day(7)]);
        let found = probe_latest_trade_date(&provider, day(10), 10).await.unwrap();
        assert_eq!(found, day(7));
        assert_eq!(provider.probes.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_probe_is_bounded() {
        let provider = CalendarProvider::new(vec![day(1)]);
        let err = probe_latest_trade_date(&provider, day(20), 5)
            .await
            .unwrap_err();
        assert!(err.is_data_unavailable());
        assert_eq!(provider.probes.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_probe_skips_failing_dates() {
        let mut provider = CalendarProvider::new(vec![day(5)]);
        provider.broken_days = vec![day(7), day(6)];
        let found = probe_latest_trade_date(&provider, day(7), 10).await.unwrap();
        assert_eq!(found, day(5));
    }

    #[tokio::test]
    async fn test_probe_aborts_when_unavailable() {
        let mut provider = CalendarProvider::new(vec![day(5)]);
        provider.unavailable = true;
        let err = probe_latest_trade_date(&provider, day(7), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketDataError::ProviderUnavailable { .. }));
        assert_eq!(provider.probes.load(Ordering::SeqCst), 1);
    }
}
