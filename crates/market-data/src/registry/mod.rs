//! Provider registry module.
//!
//! This module provides orchestration for market data providers, including:
//! - Provider registration and priority ordering
//! - Fallback across providers with per-call timeouts
//! - Sliding window rate limiting per provider
//! - Attempt diagnostics for tuning provider priority

mod diagnostics;
mod rate_limiter;
#[allow(clippy::module_inception)]
mod registry;

pub use diagnostics::{AttemptOutcome, FetchDiagnostics, ProviderAttempt};
pub use rate_limiter::{
    apply_margin, LimiterSettings, RateLimitTier, RateLimiter, RateLimiterRegistry,
    RateLimiterStats, DEFAULT_SAFETY_MARGIN,
};
pub use registry::{
    CheckedFetch, FetchOutput, Fetched, ProviderDescriptor, ProviderHealth, ProviderRegistry,
    DEFAULT_CALL_TIMEOUT,
};
