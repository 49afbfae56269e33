//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that all providers implement
//! - Provider capabilities and declared upstream quotas
//! - Concrete provider implementations (Tushare, Eastmoney)
//!
//! # Architecture
//!
//! The provider system is designed to be:
//! - **Provider-agnostic**: The registry only sees the trait and capability flags
//! - **Extensible**: New providers can be added by implementing `MarketDataProvider`
//! - **Explicit about gaps**: Unsupported queries return `NotSupported`
//!
//! Adapters normalize codes and units before returning, so results from
//! different providers are directly comparable.

mod capabilities;
mod convert;
mod traits;

pub mod eastmoney;
pub mod tushare;

// Re-exports
pub use capabilities::{ProviderCapabilities, QueryKind, RateLimit};
pub use traits::{market_today, probe_latest_trade_date, MarketDataProvider, DEFAULT_PROBE_DAYS};
