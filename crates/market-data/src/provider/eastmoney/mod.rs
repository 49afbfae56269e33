//! Eastmoney market data provider implementation.
//!
//! This module provides A-share data from Eastmoney's keyless quote list
//! endpoint (`/api/qt/clist/get`), which returns one full-market snapshot:
//! - Roster: code and name of every instrument in the snapshot
//! - Daily metrics: only for the snapshot's own trading date
//! - Latest trade date: the snapshot date itself
//! - Realtime quotes: price, change and turnover columns of the same snapshot
//!
//! The snapshot's PE column (`f9`) is the dynamic PE and is not comparable
//! with the static PE other providers report, so it is not requested; the
//! TTM PE (`f115`) is.
//!
//! Field names are Eastmoney's numeric `fNN` codes; `"-"` marks a missing
//! value.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use chrono_tz::Asia::Shanghai;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::convert::{
    parse_decimal, parse_scaled, parse_text, SHARES_PER_LOT, SHARES_PER_WAN, YUAN_PER_YI,
};
use super::traits::market_today;
use crate::errors::MarketDataError;
use crate::models::{
    normalize_code, MetricField, MetricRecord, MetricsResult, QuoteResult, RealtimeQuote,
    RosterResult, StockInfo,
};
use crate::provider::{MarketDataProvider, ProviderCapabilities, QueryKind, RateLimit};
use crate::registry::RateLimiter;

const BASE_URL: &str = "https://82.push2.eastmoney.com";
const PROVIDER_ID: &str = "EASTMONEY";

/// Shanghai and Shenzhen main boards, ChiNext, STAR and Beijing.
const MARKET_FILTER: &str = "m:0+t:6,m:0+t:80,m:1+t:2,m:1+t:23,m:0+t:81+s:2048";
const SNAPSHOT_FIELDS: &str =
    "f2,f3,f5,f6,f8,f10,f12,f14,f15,f16,f17,f18,f20,f21,f23,f38,f39,f115,f124";
const PAGE_SIZE: &str = "6000";

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct ClistResponse {
    #[serde(default)]
    rc: i64,
    #[serde(default)]
    data: Option<ClistData>,
}

#[derive(Debug, Deserialize)]
struct ClistData {
    #[serde(default)]
    diff: Vec<SnapshotRow>,
}

/// One instrument in the snapshot. Missing keys deserialize as `Null`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SnapshotRow {
    /// Latest price (CNY)
    f2: Value,
    /// Change (%)
    f3: Value,
    /// Volume (lots)
    f5: Value,
    /// Amount (CNY)
    f6: Value,
    /// Turnover rate (%)
    f8: Value,
    /// Volume ratio
    f10: Value,
    /// Code
    f12: Value,
    /// Name
    f14: Value,
    /// High
    f15: Value,
    /// Low
    f16: Value,
    /// Open
    f17: Value,
    /// Previous close
    f18: Value,
    /// Total market cap (CNY)
    f20: Value,
    /// Float market cap (CNY)
    f21: Value,
    /// PB
    f23: Value,
    /// Total shares
    f38: Value,
    /// Float shares
    f39: Value,
    /// PE (TTM)
    f115: Value,
    /// Last update, unix seconds
    f124: Value,
}

/// Decoded snapshot: normalized rows plus the trading date they describe.
#[derive(Debug)]
struct Snapshot {
    as_of: NaiveDate,
    rows: Vec<(StockInfo, MetricRecord, RealtimeQuote)>,
}

impl Snapshot {
    fn roster(&self) -> RosterResult {
        let mut roster = RosterResult::new(PROVIDER_ID.into(), self.as_of);
        for (stock, _, _) in &self.rows {
            roster.insert(stock.clone());
        }
        roster
    }

    fn metrics(self) -> MetricsResult {
        let mut metrics = MetricsResult::new(PROVIDER_ID.into(), self.as_of);
        for (_, record, _) in self.rows {
            metrics.insert(record);
        }
        metrics
    }

    /// Quotes of instruments that traded; suspended rows carry no price.
    fn quotes(self) -> QuoteResult {
        let mut quotes = QuoteResult::new(PROVIDER_ID.into(), self.as_of);
        for (_, _, quote) in self.rows {
            if quote.price.is_some() {
                quotes.insert(quote);
            }
        }
        quotes
    }
}

// ============================================================================
// EastmoneyProvider
// ============================================================================

/// Eastmoney snapshot provider.
///
/// Needs no credentials; only the current trading day is served.
pub struct EastmoneyProvider {
    client: Client,
    base_url: String,
    enabled: bool,
    limiter: Arc<RateLimiter>,
}

impl EastmoneyProvider {
    pub const ID: &'static str = PROVIDER_ID;

    /// No published quota; stay conservative.
    pub const DECLARED_LIMIT: RateLimit = RateLimit {
        max_calls: 60,
        window: Duration::from_secs(60),
    };

    /// Create a new Eastmoney provider using `limiter` for every request.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: BASE_URL.to_string(),
            enabled: true,
            limiter,
        }
    }

    /// Point the provider at another endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Fetch and decode the full-market snapshot.
    async fn fetch_snapshot(&self) -> Result<Snapshot, MarketDataError> {
        if !self.enabled {
            return Err(MarketDataError::unavailable(PROVIDER_ID, "disabled"));
        }

        let url = format!("{}/api/qt/clist/get", self.base_url);
        let params = [
            ("pn", "1"),
            ("pz", PAGE_SIZE),
            ("po", "1"),
            ("np", "1"),
            ("fltt", "2"),
            ("invt", "2"),
            ("fid", "f3"),
            ("fs", MARKET_FILTER),
            ("fields", SNAPSHOT_FIELDS),
        ];

        self.limiter.acquire().await;
        debug!("Eastmoney request: {}", url);

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MarketDataError::Timeout {
                        provider: PROVIDER_ID.to_string(),
                    }
                } else if e.is_connect() {
                    MarketDataError::unavailable(PROVIDER_ID, format!("connection failed: {}", e))
                } else {
                    MarketDataError::provider(PROVIDER_ID, format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::provider(
                PROVIDER_ID,
                format!("HTTP {} - {}", status, body),
            ));
        }

        let text = response.text().await.map_err(|e| {
            MarketDataError::provider(PROVIDER_ID, format!("Failed to read response: {}", e))
        })?;

        let snapshot = parse_snapshot(&text, market_today())?;
        info!(
            "Eastmoney: snapshot of {} instruments for {}",
            snapshot.rows.len(),
            snapshot.as_of
        );
        Ok(snapshot)
    }
}

/// Decode a `clist/get` body.
///
/// The snapshot date is the newest update timestamp in the rows, in exchange
/// time; `fallback_date` is used when no row carries one.
fn parse_snapshot(text: &str, fallback_date: NaiveDate) -> Result<Snapshot, MarketDataError> {
    let response: ClistResponse = serde_json::from_str(text).map_err(|e| {
        MarketDataError::provider(PROVIDER_ID, format!("Failed to parse snapshot: {}", e))
    })?;

    if response.rc != 0 {
        return Err(MarketDataError::provider(
            PROVIDER_ID,
            format!("snapshot failed with rc {}", response.rc),
        ));
    }

    let diff = response.data.map(|d| d.diff).unwrap_or_default();
    let as_of = diff
        .iter()
        .filter_map(|row| row.f124.as_i64())
        .filter(|ts| *ts > 0)
        .max()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|t| t.with_timezone(&Shanghai).date_naive())
        .unwrap_or(fallback_date);

    let mut rows = Vec::with_capacity(diff.len());
    for row in &diff {
        let Some(raw_code) = parse_text(&row.f12) else {
            continue;
        };
        let Some(code) = normalize_code(&raw_code) else {
            debug!("Eastmoney: dropping row with code '{}'", raw_code);
            continue;
        };
        let name = parse_text(&row.f14).unwrap_or_default();
        let Some(stock) = StockInfo::from_raw(&code, name.clone()) else {
            continue;
        };

        let mut record = MetricRecord::new(code);
        record.name = (!name.is_empty()).then_some(name);
        record.set(MetricField::Close, parse_decimal(&row.f2));
        record.set(MetricField::TurnoverRate, parse_decimal(&row.f8));
        record.set(MetricField::VolumeRatio, parse_decimal(&row.f10));
        record.set(MetricField::TotalMv, parse_scaled(&row.f20, YUAN_PER_YI));
        record.set(MetricField::CircMv, parse_scaled(&row.f21, YUAN_PER_YI));
        record.set(MetricField::Pb, parse_decimal(&row.f23));
        record.set(MetricField::TotalShare, parse_scaled(&row.f38, SHARES_PER_WAN));
        record.set(MetricField::FloatShare, parse_scaled(&row.f39, SHARES_PER_WAN));
        record.set(MetricField::PeTtm, parse_decimal(&row.f115));

        let quote = RealtimeQuote {
            name: record.name.clone(),
            price: parse_decimal(&row.f2),
            pre_close: parse_decimal(&row.f18),
            open: parse_decimal(&row.f17),
            high: parse_decimal(&row.f15),
            low: parse_decimal(&row.f16),
            change_pct: parse_decimal(&row.f3),
            volume: parse_decimal(&row.f5).and_then(|lots| lots.checked_mul(SHARES_PER_LOT)),
            amount: parse_decimal(&row.f6),
            ..RealtimeQuote::new(record.code.clone())
        };

        rows.push((stock, record, quote));
    }

    Ok(Snapshot { as_of, rows })
}

// ============================================================================
// MarketDataProvider Implementation
// ============================================================================

#[async_trait]
impl MarketDataProvider for EastmoneyProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        2
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            query_kinds: &[
                QueryKind::StockList,
                QueryKind::DailyMetrics,
                QueryKind::LatestTradeDate,
                QueryKind::RealtimeQuotes,
            ],
            historical_metrics: false,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        Self::DECLARED_LIMIT
    }

    fn is_available(&self) -> bool {
        self.enabled
    }

    async fn get_stock_list(&self) -> Result<RosterResult, MarketDataError> {
        let roster = self.fetch_snapshot().await?.roster();
        if roster.is_empty() {
            return Err(MarketDataError::no_data(PROVIDER_ID, "empty snapshot"));
        }
        Ok(roster)
    }

    async fn get_daily_metrics(&self, date: NaiveDate) -> Result<MetricsResult, MarketDataError> {
        let snapshot = self.fetch_snapshot().await?;
        if snapshot.as_of != date {
            return Err(MarketDataError::no_data(
                PROVIDER_ID,
                format!("snapshot is for {}, not {}", snapshot.as_of, date),
            ));
        }
        let metrics = snapshot.metrics();
        if metrics.is_empty() {
            return Err(MarketDataError::no_data(PROVIDER_ID, "empty snapshot"));
        }
        Ok(metrics)
    }

    async fn get_realtime_quotes(&self) -> Result<QuoteResult, MarketDataError> {
        let quotes = self.fetch_snapshot().await?.quotes();
        if quotes.is_empty() {
            return Err(MarketDataError::no_data(PROVIDER_ID, "no priced rows in snapshot"));
        }
        Ok(quotes)
    }

    async fn get_latest_trade_date(&self, _probe_days: u32) -> Result<NaiveDate, MarketDataError> {
        let snapshot = self.fetch_snapshot().await?;
        if snapshot.rows.is_empty() {
            return Err(MarketDataError::no_data(PROVIDER_ID, "empty snapshot"));
        }
        Ok(snapshot.as_of)
    }
}
