//! Provider capabilities and rate limiting configuration.
//!
//! This module defines structures for describing what a market data provider
//! can answer and how hard it may be called.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Logical queries a provider may answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Full instrument roster
    StockList,
    /// Per-instrument valuation metrics for one date
    DailyMetrics,
    /// Most recent date with published data
    LatestTradeDate,
    /// Intraday quote snapshot of the whole market
    RealtimeQuotes,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StockList => "stock_list",
            Self::DailyMetrics => "daily_metrics",
            Self::LatestTradeDate => "latest_trade_date",
            Self::RealtimeQuotes => "realtime_quotes",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes the capabilities of a market data provider.
///
/// Used by the registry to decide which providers are candidates for a query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderCapabilities {
    /// Queries this provider answers.
    pub query_kinds: &'static [QueryKind],

    /// Whether daily metrics can be requested for past dates,
    /// or only for the current snapshot.
    pub historical_metrics: bool,
}

impl ProviderCapabilities {
    pub fn supports(&self, kind: QueryKind) -> bool {
        self.query_kinds.contains(&kind)
    }
}

/// Upstream quota a provider declares for itself.
///
/// This is the hard limit published by the upstream. The limiter registry
/// scales it down by the configured safety margin unless an explicit
/// limit is configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimit {
    /// Maximum calls allowed inside one window.
    pub max_calls: u32,

    /// Length of the sliding window.
    pub window: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_calls: 60,
            window: Duration::from_secs(60),
        }
    }
}
