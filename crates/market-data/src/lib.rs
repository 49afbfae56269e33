//! Marketsync Market Data Crate
//!
//! Multi-source acquisition of China A-share reference data: the instrument
//! roster, daily valuation metrics, intraday quotes and the latest trading
//! date.
//!
//! # Overview
//!
//! The market data crate supports:
//! - Multiple providers behind one trait (Tushare, Eastmoney)
//! - Sliding-window rate limiting per provider
//! - Priority-ordered fallback across providers
//! - Cross-provider consistency checks and reconciliation
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! | ProviderRegistry |  (priority order, fallback, timeouts)
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! |    Provider      | --> |   RateLimiter    |  (one per provider)
//! +------------------+     +------------------+
//!          |
//!          v
//! +------------------+
//! |   QueryResult    |  (normalized codes and units)
//! +------------------+
//!          |
//!          v
//! +--------------------+     +------------------+
//! | ConsistencyChecker | --> |     resolve      |  (ResolvedRecord)
//! +--------------------+     +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`MarketDataProvider`] - Provider adapter trait
//! - [`ProviderRegistry`] - Ordered fallback over providers
//! - [`RateLimiter`] - Sliding-window call limiter
//! - [`ConsistencyChecker`] - Compares two providers' metrics
//! - [`MetricRecord`] - Daily metrics for one instrument
//! - [`StockInfo`] - Roster row for one instrument

pub mod consistency;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;

// Re-export all public types from models
pub use models::{
    normalize_code, Board, Exchange, MetricField, MetricRecord, MetricsResult, ProviderId,
    QueryResult, QuoteResult, RealtimeQuote, RosterResult, StockCode, StockInfo,
};

// Re-export provider types
pub use provider::eastmoney::EastmoneyProvider;
pub use provider::tushare::TushareProvider;
pub use provider::{
    market_today, MarketDataProvider, ProviderCapabilities, QueryKind, RateLimit,
    DEFAULT_PROBE_DAYS,
};

// Re-export registry types
pub use registry::{
    CheckedFetch, FetchDiagnostics, Fetched, LimiterSettings, ProviderDescriptor, ProviderHealth,
    ProviderRegistry, RateLimitTier, RateLimiter, RateLimiterRegistry, RateLimiterStats,
    DEFAULT_CALL_TIMEOUT,
};

// Re-export consistency types
pub use consistency::{
    resolve, ConsistencyChecker, ConsistencyConfig, ConsistencyReport, FieldDifference,
    Resolution, ResolutionStrategy, ResolvedRecord,
};

// Re-export error types
pub use errors::{FailureKind, MarketDataError, ProviderFailure};
