//! Market data models
//!
//! This module contains the core data types shared by providers, the registry
//! and the consistency checker:
//! - `types` - Type aliases for common identifiers (ProviderId, StockCode)
//! - `code` - Instrument code normalization and exchange/board inference
//! - `stock` - Roster rows (StockInfo)
//! - `metrics` - Daily valuation metrics (MetricField, MetricRecord)
//! - `quote` - Intraday quote rows (RealtimeQuote)
//! - `result` - Provider-tagged result sets (QueryResult)

mod code;
mod metrics;
mod quote;
mod result;
mod stock;
mod types;

pub use code::{normalize_code, Board, Exchange};
pub use metrics::{MetricField, MetricRecord};
pub use quote::RealtimeQuote;
pub use result::{MetricsResult, QueryResult, QuoteResult, RosterResult};
pub use stock::StockInfo;
pub use types::{ProviderId, StockCode};
