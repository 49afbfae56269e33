use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::metrics::MetricRecord;
use super::quote::RealtimeQuote;
use super::stock::StockInfo;
use super::types::{ProviderId, StockCode};

/// Rows returned by one provider for one query, keyed by normalized code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult<T> {
    /// Provider that produced the rows
    pub source: ProviderId,

    /// Trading date the rows describe
    pub as_of: NaiveDate,

    pub rows: BTreeMap<StockCode, T>,
}

/// Full instrument roster.
pub type RosterResult = QueryResult<StockInfo>;

/// Per-instrument metrics for one date.
pub type MetricsResult = QueryResult<MetricRecord>;

/// Latest quote per instrument; `as_of` is the trading day quoted.
pub type QuoteResult = QueryResult<RealtimeQuote>;

impl<T> QueryResult<T> {
    pub fn new(source: ProviderId, as_of: NaiveDate) -> Self {
        Self {
            source,
            as_of,
            rows: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RosterResult {
    /// Insert a roster row. A later row for the same code replaces the earlier one.
    pub fn insert(&mut self, stock: StockInfo) {
        self.rows.insert(stock.code.clone(), stock);
    }
}

impl MetricsResult {
    pub fn insert(&mut self, record: MetricRecord) {
        self.rows.insert(record.code.clone(), record);
    }

    /// Total number of populated values across all rows.
    pub fn populated_values(&self) -> usize {
        self.rows.values().map(MetricRecord::populated_count).sum()
    }
}

impl QuoteResult {
    pub fn insert(&mut self, quote: RealtimeQuote) {
        self.rows.insert(quote.code.clone(), quote);
    }
}
