//! Tushare Pro market data provider implementation.
//!
//! This module provides A-share reference data from the Tushare Pro HTTP API:
//! - Listed-instrument roster via `stock_basic`
//! - Daily valuation metrics via `daily_basic` (historical dates supported)
//! - Latest trade date by probing `daily_basic` backward from today
//! - Realtime quotes via `rt_k` (whole market by code wildcard)
//!
//! Every call is a token-authenticated JSON POST of
//! `{api_name, token, params, fields}` answered by a column/row table.
//! Quotas depend on the account's point tier; see `RateLimitTier`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::convert::{
    compact_date, parse_compact_date, parse_decimal, parse_scaled, parse_text, SHARES_PER_LOT,
    WAN_PER_YI,
};
use super::traits::market_today;
use crate::errors::MarketDataError;
use crate::models::{
    normalize_code, MetricField, MetricRecord, MetricsResult, QuoteResult, RealtimeQuote,
    RosterResult, StockInfo,
};
use crate::provider::{MarketDataProvider, ProviderCapabilities, QueryKind, RateLimit};
use crate::registry::RateLimiter;

const BASE_URL: &str = "http://api.tushare.pro";
const PROVIDER_ID: &str = "TUSHARE";

/// Upstream code for "too many calls for your tier".
const CODE_RATE_LIMITED: i64 = 40203;
/// Upstream code for an invalid or expired token.
const CODE_BAD_TOKEN: i64 = 40101;

const ROSTER_FIELDS: &str = "ts_code,symbol,name,area,industry,market,list_date";
const METRIC_FIELDS: &str = "ts_code,close,turnover_rate,volume_ratio,pe,pe_ttm,pb,ps,ps_ttm,total_share,float_share,total_mv,circ_mv";
const PROBE_FIELDS: &str = "ts_code,total_mv";
const QUOTE_FIELDS: &str = "ts_code,name,pre_close,open,high,low,close,pct_chg,vol,amount";

/// `rt_k` code wildcards covering both exchanges and Beijing.
const QUOTE_UNIVERSE: &str = "3*.SZ,6*.SH,0*.SZ,9*.BJ";

static NULL: Value = Value::Null;

/// Columns copied as-is. Shares are already reported in 10k shares.
const PLAIN_COLUMNS: [(&str, MetricField); 10] = [
    ("close", MetricField::Close),
    ("turnover_rate", MetricField::TurnoverRate),
    ("volume_ratio", MetricField::VolumeRatio),
    ("pe", MetricField::Pe),
    ("pe_ttm", MetricField::PeTtm),
    ("pb", MetricField::Pb),
    ("ps", MetricField::Ps),
    ("ps_ttm", MetricField::PsTtm),
    ("total_share", MetricField::TotalShare),
    ("float_share", MetricField::FloatShare),
];

/// Market caps, reported in 10k CNY.
const CAP_COLUMNS: [(&str, MetricField); 2] = [
    ("total_mv", MetricField::TotalMv),
    ("circ_mv", MetricField::CircMv),
];

// ============================================================================
// API Request/Response Structures
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    api_name: &'a str,
    token: &'a str,
    params: HashMap<&'a str, String>,
    fields: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<Table>,
}

/// Column-oriented table returned by every API.
#[derive(Debug, Default, Deserialize)]
struct Table {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    items: Vec<Vec<Value>>,
}

impl Table {
    fn column(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    fn cell(row: &[Value], index: Option<usize>) -> &Value {
        index.and_then(|i| row.get(i)).unwrap_or(&NULL)
    }
}

// ============================================================================
// TushareProvider
// ============================================================================

/// Tushare Pro provider.
///
/// Unavailable without a token. Historical metrics are supported.
pub struct TushareProvider {
    client: Client,
    token: Option<String>,
    base_url: String,
    enabled: bool,
    limiter: Arc<RateLimiter>,
}

impl TushareProvider {
    pub const ID: &'static str = PROVIDER_ID;

    /// Standard tier quota.
    pub const DECLARED_LIMIT: RateLimit = RateLimit {
        max_calls: 400,
        window: Duration::from_secs(60),
    };

    /// Create a new Tushare provider.
    ///
    /// `limiter` is this provider's shared limiter; every upstream request
    /// waits on it first.
    pub fn new(token: Option<String>, limiter: Arc<RateLimiter>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            token: token.filter(|t| !t.trim().is_empty()),
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

    fn token(&self) -> Result<&str, MarketDataError> {
        if !self.enabled {
            return Err(MarketDataError::unavailable(PROVIDER_ID, "disabled"));
        }
        self.token
            .as_deref()
            .ok_or_else(|| MarketDataError::unavailable(PROVIDER_ID, "missing API token"))
    }

    /// Call one API and return its table.
    async fn call(
        &self,
        api_name: &str,
        params: HashMap<&str, String>,
        fields: &str,
    ) -> Result<Table, MarketDataError> {
        let token = self.token()?;
        let body = ApiRequest {
            api_name,
            token,
            params,
            fields,
        };

        self.limiter.acquire().await;
        debug!("Tushare request: {} {:?}", api_name, body.params);

        let response = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

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
        parse_response(api_name, &text)
    }

    /// Fetch the roster of listed instruments.
    async fn fetch_roster(&self) -> Result<RosterResult, MarketDataError> {
        let params = HashMap::from([("list_status", "L".to_string())]);
        let table = self.call("stock_basic", params, ROSTER_FIELDS).await?;

        let roster = roster_from_table(&table, market_today());
        if roster.is_empty() {
            return Err(MarketDataError::no_data(PROVIDER_ID, "empty stock_basic table"));
        }
        info!("Tushare: fetched {} listed instruments", roster.len());
        Ok(roster)
    }

    /// Fetch `daily_basic` for one date.
    async fn fetch_metrics(&self, date: NaiveDate) -> Result<MetricsResult, MarketDataError> {
        let params = HashMap::from([("trade_date", compact_date(date))]);
        let table = self.call("daily_basic", params, METRIC_FIELDS).await?;

        let metrics = metrics_from_table(&table, date);
        if metrics.is_empty() {
            return Err(MarketDataError::no_data(
                PROVIDER_ID,
                format!("no daily_basic rows for {}", date),
            ));
        }
        info!("Tushare: fetched metrics for {} instruments on {}", metrics.len(), date);
        Ok(metrics)
    }

    async fn fetch_quotes(&self) -> Result<QuoteResult, MarketDataError> {
        let params = HashMap::from([("ts_code", QUOTE_UNIVERSE.to_string())]);
        let table = self.call("rt_k", params, QUOTE_FIELDS).await?;

        let quotes = quotes_from_table(&table, market_today());
        if quotes.is_empty() {
            return Err(MarketDataError::no_data(PROVIDER_ID, "empty rt_k table"));
        }
        info!("Tushare: fetched quotes for {} instruments", quotes.len());
        Ok(quotes)
    }
}

fn map_send_error(e: reqwest::Error) -> MarketDataError {
    if e.is_timeout() {
        MarketDataError::Timeout {
            provider: PROVIDER_ID.to_string(),
        }
    } else if e.is_connect() {
        MarketDataError::unavailable(PROVIDER_ID, format!("connection failed: {}", e))
    } else {
        MarketDataError::provider(PROVIDER_ID, format!("Request failed: {}", e))
    }
}

/// Decode the envelope and map upstream error codes.
fn parse_response(api_name: &str, text: &str) -> Result<Table, MarketDataError> {
    let response: ApiResponse = serde_json::from_str(text).map_err(|e| {
        MarketDataError::provider(
            PROVIDER_ID,
            format!("Failed to parse {} response: {}", api_name, e),
        )
    })?;

    let message = response.msg.unwrap_or_default();
    match response.code {
        0 => Ok(response.data.unwrap_or_default()),
        CODE_RATE_LIMITED => {
            warn!("Tushare: upstream quota exceeded for {}: {}", api_name, message);
            Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            })
        }
        CODE_BAD_TOKEN => Err(MarketDataError::unavailable(
            PROVIDER_ID,
            format!("token rejected: {}", message),
        )),
        code => Err(MarketDataError::provider(
            PROVIDER_ID,
            format!("{} failed with code {}: {}", api_name, code, message),
        )),
    }
}

fn roster_from_table(table: &Table, as_of: NaiveDate) -> RosterResult {
    let ts_code = table.column("ts_code");
    let symbol = table.column("symbol");
    let name = table.column("name");
    let area = table.column("area");
    let industry = table.column("industry");
    let list_date = table.column("list_date");

    let mut roster = RosterResult::new(PROVIDER_ID.into(), as_of);
    for row in &table.items {
        let raw_code = parse_text(Table::cell(row, symbol))
            .or_else(|| parse_text(Table::cell(row, ts_code)));
        let Some(raw_code) = raw_code else {
            continue;
        };
        let display_name = parse_text(Table::cell(row, name)).unwrap_or_default();
        let Some(mut stock) = StockInfo::from_raw(&raw_code, display_name) else {
            debug!("Tushare: dropping roster row with code '{}'", raw_code);
            continue;
        };
        stock.area = parse_text(Table::cell(row, area));
        stock.industry = parse_text(Table::cell(row, industry));
        stock.list_date = parse_compact_date(Table::cell(row, list_date));
        roster.insert(stock);
    }
    roster
}

fn metrics_from_table(table: &Table, date: NaiveDate) -> MetricsResult {
    let ts_code = table.column("ts_code");
    let plain: Vec<_> = PLAIN_COLUMNS
        .iter()
        .map(|(column, field)| (table.column(column), *field))
        .collect();
    let caps: Vec<_> = CAP_COLUMNS
        .iter()
        .map(|(column, field)| (table.column(column), *field))
        .collect();

    let mut metrics = MetricsResult::new(PROVIDER_ID.into(), date);
    for row in &table.items {
        let Some(code) = parse_text(Table::cell(row, ts_code)).and_then(|c| normalize_code(&c))
        else {
            continue;
        };

        let mut record = MetricRecord::new(code);
        for (index, field) in &plain {
            record.set(*field, parse_decimal(Table::cell(row, *index)));
        }
        for (index, field) in &caps {
            record.set(*field, parse_scaled(Table::cell(row, *index), WAN_PER_YI));
        }
        metrics.insert(record);
    }
    metrics
}

/// Decode `rt_k`. Volume comes in lots; rows without a close are dropped.
fn quotes_from_table(table: &Table, as_of: NaiveDate) -> QuoteResult {
    let ts_code = table.column("ts_code");
    let name = table.column("name");
    let pre_close = table.column("pre_close");
    let open = table.column("open");
    let high = table.column("high");
    let low = table.column("low");
    let close = table.column("close");
    let pct_chg = table.column("pct_chg");
    let vol = table.column("vol");
    let amount = table.column("amount");

    let mut quotes = QuoteResult::new(PROVIDER_ID.into(), as_of);
    for row in &table.items {
        let Some(code) = parse_text(Table::cell(row, ts_code)).and_then(|c| normalize_code(&c))
        else {
            continue;
        };
        let price = parse_decimal(Table::cell(row, close));
        if price.is_none() {
            continue;
        }

        let mut quote = RealtimeQuote {
            name: parse_text(Table::cell(row, name)),
            price,
            pre_close: parse_decimal(Table::cell(row, pre_close)),
            open: parse_decimal(Table::cell(row, open)),
            high: parse_decimal(Table::cell(row, high)),
            low: parse_decimal(Table::cell(row, low)),
            change_pct: parse_decimal(Table::cell(row, pct_chg)),
            volume: parse_decimal(Table::cell(row, vol)).and_then(|v| v.checked_mul(SHARES_PER_LOT)),
            amount: parse_decimal(Table::cell(row, amount)),
            ..RealtimeQuote::new(code)
        };
        quote.fill_change_pct();
        quotes.insert(quote);
    }
    quotes
}

// ============================================================================
// MarketDataProvider Implementation
// ============================================================================

#[async_trait]
impl MarketDataProvider for TushareProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn priority(&self) -> u8 {
        1
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
        Self::DECLARED_LIMIT
    }

    fn is_available(&self) -> bool {
        self.token().is_ok()
    }

    async fn get_stock_list(&self) -> Result<RosterResult, MarketDataError> {
        self.fetch_roster().await
    }

    async fn get_daily_metrics(&self, date: NaiveDate) -> Result<MetricsResult, MarketDataError> {
        self.fetch_metrics(date).await
    }

    async fn get_realtime_quotes(&self) -> Result<QuoteResult, MarketDataError> {
        self.fetch_quotes().await
    }

    async fn probe_trade_date(&self, date: NaiveDate) -> Result<bool, MarketDataError> {
        let params = HashMap::from([("trade_date", compact_date(date))]);
        let table = self.call("daily_basic", params, PROBE_FIELDS).await?;
        Ok(!table.items.is_empty())
    }
}
