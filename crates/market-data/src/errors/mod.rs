//! Error types and failure classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all provider and registry operations
//! - [`FailureKind`]: Coarse classification used for fallback decisions and logging
//! - [`ProviderFailure`]: One provider's failure, as collected by the fallback selector

mod failure;

pub use failure::{FailureKind, ProviderFailure};

use thiserror::Error;

/// Errors that can occur during market data operations.
///
/// Adapter-level variants are converted into fallback decisions by the
/// provider registry; only [`MarketDataError::AllProvidersFailed`] and
/// [`MarketDataError::NoProvidersAvailable`] normally reach callers of the registry.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The provider is misconfigured, lacks credentials, or cannot be reached.
    #[error("Provider unavailable: {provider} - {reason}")]
    ProviderUnavailable {
        /// The provider that is unavailable
        provider: String,
        /// Why the provider is unavailable
        reason: String,
    },

    /// The provider answered but had nothing for the query
    /// (non-trading day, unknown date, empty table).
    #[error("No data from {provider}: {message}")]
    DataUnavailable {
        /// The provider that returned nothing
        provider: String,
        /// What was asked for
        message: String,
    },

    /// The provider does not implement this capability.
    #[error("Operation '{operation}' not supported by {provider}")]
    NotSupported {
        /// The unsupported operation
        operation: String,
        /// The provider lacking the capability
        provider: String,
    },

    /// The upstream rejected the call because of its own quota.
    #[error("Rate limited by upstream: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The call did not finish within the configured timeout.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// A provider-specific error occurred (bad status, malformed payload).
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// No registered provider supports the requested query kind.
    #[error("No providers available for {0}")]
    NoProvidersAvailable(String),

    /// Every candidate provider was tried and none produced data.
    #[error("All providers failed: {}", summarize(.failures))]
    AllProvidersFailed {
        /// Individual failure of every provider that was considered
        failures: Vec<ProviderFailure>,
    },

    /// A network error occurred while communicating with a provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

fn summarize(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no attempts".to_string();
    }
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl MarketDataError {
    /// Returns the failure classification for this error.
    ///
    /// ```
    /// use marketsync_market_data::errors::{FailureKind, MarketDataError};
    ///
    /// let error = MarketDataError::DataUnavailable {
    ///     provider: "TUSHARE".to_string(),
    ///     message: "daily metrics for 2024-06-01".to_string(),
    /// };
    /// assert_eq!(error.failure_kind(), FailureKind::Empty);
    /// ```
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::ProviderUnavailable { .. } => FailureKind::Unavailable,
            Self::DataUnavailable { .. } => FailureKind::Empty,
            Self::NotSupported { .. } => FailureKind::NotSupported,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::RateLimited { .. }
            | Self::ProviderError { .. }
            | Self::Network(_)
            | Self::NoProvidersAvailable(_)
            | Self::AllProvidersFailed { .. } => FailureKind::Error,
        }
    }

    /// Whether this is the "provider has nothing for this query" condition
    /// rather than a broken provider.
    pub fn is_data_unavailable(&self) -> bool {
        matches!(self, Self::DataUnavailable { .. })
    }

    /// Provider failures carried by an aggregate failure, empty otherwise.
    pub fn provider_failures(&self) -> &[ProviderFailure] {
        match self {
            Self::AllProvidersFailed { failures } => failures,
            _ => &[],
        }
    }

    pub(crate) fn unavailable(provider: &str, reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn no_data(provider: &str, message: impl Into<String>) -> Self {
        Self::DataUnavailable {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn provider(provider: &str, message: impl Into<String>) -> Self {
        Self::ProviderError {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    #[test]
    fn test_unavailable_classified() {
        let error = MarketDataError::unavailable("TUSHARE", "missing token");
        assert_eq!(error.failure_kind(), FailureKind::Unavailable);
    }

    #[test]
    fn test_data_unavailable_is_empty_not_error() {
        let error = MarketDataError::no_data("EASTMONEY", "snapshot is for 2024-06-03");
        assert_eq!(error.failure_kind(), FailureKind::Empty);
        assert!(error.is_data_unavailable());
    }

    #[test]
    fn test_timeout_classified() {
        let error = MarketDataError::Timeout {
            provider: "TUSHARE".to_string(),
        };
        assert_eq!(error.failure_kind(), FailureKind::Timeout);
    }

    #[test]
    fn test_upstream_rate_limit_is_plain_error() {
        let error = MarketDataError::RateLimited {
            provider: "TUSHARE".to_string(),
        };
        assert_eq!(error.failure_kind(), FailureKind::Error);
    }

    #[test]
    fn test_not_supported_classified() {
        let error = MarketDataError::NotSupported {
            operation: "stock_list".to_string(),
            provider: "EASTMONEY".to_string(),
        };
        assert_eq!(error.failure_kind(), FailureKind::NotSupported);
    }

    #[test]
    fn test_aggregate_failure_lists_every_provider() {
        let error = MarketDataError::AllProvidersFailed {
            failures: vec![
                ProviderFailure::new(
                    Cow::Borrowed("A"),
                    FailureKind::Unavailable,
                    "missing token",
                ),
                ProviderFailure::new(Cow::Borrowed("B"), FailureKind::Empty, "no rows"),
            ],
        };
        assert_eq!(error.provider_failures().len(), 2);
        assert_eq!(
            format!("{}", error),
            "All providers failed: A: unavailable (missing token); B: empty (no rows)"
        );
    }

    #[test]
    fn test_error_display() {
        let error = MarketDataError::provider("TUSHARE", "HTTP 500");
        assert_eq!(format!("{}", error), "Provider error: TUSHARE - HTTP 500");

        let error = MarketDataError::NoProvidersAvailable("stock_list".to_string());
        assert_eq!(format!("{}", error), "No providers available for stock_list");
    }
}
