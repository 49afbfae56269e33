//! Sliding window rate limiter for market data providers.
//!
//! Each provider gets exactly one [`RateLimiter`], created once by the
//! [`RateLimiterRegistry`] and shared by handle with the adapter and any
//! concurrent caller. A limiter admits at most `max_calls` acquisitions inside
//! any trailing window of length `window`.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::provider::RateLimit;

/// Slack added to every computed wait so the oldest call has left the window
/// by the time the waiter re-checks.
const WAIT_BUFFER: Duration = Duration::from_millis(10);

/// Default safety margin applied to tier and provider-declared limits.
pub const DEFAULT_SAFETY_MARGIN: f64 = 0.8;

/// Account tiers with pre-baked quotas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitTier {
    Free,
    Basic,
    #[default]
    Standard,
    Premium,
    Vip,
}

impl RateLimitTier {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "free" => Some(Self::Free),
            "basic" => Some(Self::Basic),
            "standard" => Some(Self::Standard),
            "premium" => Some(Self::Premium),
            "vip" => Some(Self::Vip),
            _ => None,
        }
    }

    /// Parse a tier name, falling back to the default tier for unknown names.
    pub fn parse_or_default(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            let fallback = Self::default();
            warn!(
                "Unknown rate limit tier '{}', using '{}'",
                name,
                fallback.as_str()
            );
            fallback
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::Vip => "vip",
        }
    }

    /// Hard quota of the tier before any safety margin.
    pub fn limits(&self) -> RateLimit {
        let max_calls = match self {
            Self::Free => 100,
            Self::Basic => 200,
            Self::Standard => 400,
            Self::Premium => 600,
            Self::Vip => 800,
        };
        RateLimit {
            max_calls,
            window: Duration::from_secs(60),
        }
    }
}

impl fmt::Display for RateLimitTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `floor(max_calls * margin)`, never below one call.
pub fn apply_margin(limit: RateLimit, margin: f64) -> RateLimit {
    let scaled = (f64::from(limit.max_calls) * margin).floor();
    let max_calls = if scaled.is_finite() && scaled >= 1.0 {
        scaled.min(f64::from(u32::MAX)) as u32
    } else {
        1
    };
    RateLimit {
        max_calls,
        window: limit.window,
    }
}

/// Per-provider limiter settings as configured.
///
/// Resolution order: explicit `max_calls` + `window` are used verbatim;
/// otherwise the tier quota scaled by the margin; otherwise the
/// provider-declared quota scaled by the margin.
#[derive(Clone, Debug, PartialEq)]
pub struct LimiterSettings {
    pub tier: Option<RateLimitTier>,
    pub safety_margin: f64,
    pub max_calls: Option<u32>,
    pub window: Option<Duration>,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            tier: None,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            max_calls: None,
            window: None,
        }
    }
}

impl LimiterSettings {
    pub fn with_tier(tier: RateLimitTier, safety_margin: f64) -> Self {
        Self {
            tier: Some(tier),
            safety_margin,
            ..Self::default()
        }
    }

    pub fn explicit(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls: Some(max_calls),
            window: Some(window),
            ..Self::default()
        }
    }

    /// Effective limit for a provider declaring `declared`.
    pub fn resolve(&self, declared: RateLimit) -> RateLimit {
        if let (Some(max_calls), Some(window)) = (self.max_calls, self.window) {
            return RateLimit {
                max_calls: max_calls.max(1),
                window,
            };
        }
        let base = self.tier.map(|t| t.limits()).unwrap_or(declared);
        apply_margin(base, self.safety_margin)
    }
}

/// Snapshot of one limiter's state and counters.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterStats {
    pub name: String,
    pub max_calls: u32,
    pub window_secs: f64,
    /// Calls currently inside the trailing window
    pub current_calls: usize,
    pub total_calls: u64,
    pub total_waits: u64,
    pub total_wait_secs: f64,
    pub avg_wait_secs: f64,
}

#[derive(Debug, Default)]
struct WindowState {
    /// Grant times, oldest first.
    calls: VecDeque<Instant>,
    total_calls: u64,
    total_waits: u64,
    total_wait: Duration,
}

impl WindowState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.calls.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding window limiter for one provider.
pub struct RateLimiter {
    name: String,
    max_calls: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("max_calls", &self.max_calls)
            .field("window", &self.window)
            .finish()
    }
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, limit: RateLimit) -> Self {
        let name = name.into();
        let max_calls = limit.max_calls.max(1);
        info!(
            "Rate limiter '{}': {} calls per {:?}",
            name, max_calls, limit.window
        );
        Self {
            name,
            max_calls,
            window: limit.window,
            state: Mutex::new(WindowState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> RateLimit {
        RateLimit {
            max_calls: self.max_calls,
            window: self.window,
        }
    }

    /// Lock the window state, recovering from poison if necessary.
    ///
    /// A poisoned lock only means a panic happened while bookkeeping; the
    /// timestamps are still usable.
    fn lock_state(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter '{}' mutex was poisoned, recovering", self.name);
            poisoned.into_inner()
        })
    }

    /// Wait until a call slot is free, then claim it.
    ///
    /// The lock is released while sleeping and the window is re-checked
    /// after every wake-up, so concurrent waiters never share a slot.
    pub async fn acquire(&self) {
        let mut wait_started: Option<Instant> = None;

        loop {
            let wait_time = {
                let mut state = self.lock_state();
                let now = Instant::now();
                state.prune(now, self.window);

                if state.calls.len() < self.max_calls as usize {
                    state.calls.push_back(now);
                    state.total_calls += 1;
                    if let Some(started) = wait_started {
                        state.total_waits += 1;
                        state.total_wait += now.saturating_duration_since(started);
                    }
                    return;
                }

                match state.calls.front() {
                    Some(oldest) => (*oldest + self.window + WAIT_BUFFER).saturating_duration_since(now),
                    None => WAIT_BUFFER,
                }
            };

            debug!(
                "Rate limiter '{}': window full, waiting {:?}",
                self.name, wait_time
            );
            wait_started.get_or_insert_with(Instant::now);
            tokio::time::sleep(wait_time).await;
        }
    }

    pub fn stats(&self) -> RateLimiterStats {
        let state = self.lock_state();
        let now = Instant::now();
        let current_calls = state
            .calls
            .iter()
            .filter(|ts| now.saturating_duration_since(**ts) < self.window)
            .count();
        let total_wait_secs = state.total_wait.as_secs_f64();
        let avg_wait_secs = if state.total_waits > 0 {
            total_wait_secs / state.total_waits as f64
        } else {
            0.0
        };

        RateLimiterStats {
            name: self.name.clone(),
            max_calls: self.max_calls,
            window_secs: self.window.as_secs_f64(),
            current_calls,
            total_calls: state.total_calls,
            total_waits: state.total_waits,
            total_wait_secs,
            avg_wait_secs,
        }
    }

    /// Zero the cumulative counters. The window itself is kept.
    pub fn reset_stats(&self) {
        let mut state = self.lock_state();
        state.total_calls = 0;
        state.total_waits = 0;
        state.total_wait = Duration::ZERO;
        info!("Rate limiter '{}': statistics reset", self.name);
    }
}

/// Owner of every provider's limiter.
///
/// Built once at startup; adapters receive their limiter as an
/// `Arc<RateLimiter>` handle.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: Mutex<BTreeMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_limiters(&self) -> MutexGuard<'_, BTreeMap<String, Arc<RateLimiter>>> {
        self.limiters.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Limiter for `provider`, created with `settings` resolved against the
    /// provider's declared quota on first use.
    ///
    /// Later calls for the same provider return the existing limiter
    /// unchanged.
    pub fn limiter_for(
        &self,
        provider: &str,
        declared: RateLimit,
        settings: &LimiterSettings,
    ) -> Arc<RateLimiter> {
        let mut limiters = self.lock_limiters();
        limiters
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::new(provider, settings.resolve(declared))))
            .clone()
    }

    pub fn get(&self, provider: &str) -> Option<Arc<RateLimiter>> {
        self.lock_limiters().get(provider).cloned()
    }

    /// Stats of every limiter, ordered by provider name.
    pub fn stats(&self) -> Vec<RateLimiterStats> {
        self.lock_limiters().values().map(|l| l.stats()).collect()
    }

    pub fn reset_stats(&self) {
        for limiter in self.lock_limiters().values() {
            limiter.reset_stats();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limit(max_calls: u32, window_ms: u64) -> RateLimit {
        RateLimit {
            max_calls,
            window: Duration::from_millis(window_ms),
        }
    }

    #[test]
    fn test_tier_scaling() {
        for (tier, base) in [
            (RateLimitTier::Free, 100),
            (RateLimitTier::Basic, 200),
            (RateLimitTier::Standard, 400),
            (RateLimitTier::Premium, 600),
            (RateLimitTier::Vip, 800),
        ] {
            let settings = LimiterSettings::with_tier(tier, 0.8);
            let resolved = settings.resolve(RateLimit::default());
            assert_eq!(resolved.max_calls, (base as f64 * 0.8).floor() as u32);
            assert_eq!(resolved.window, Duration::from_secs(60));
        }
    }

    #[test]
    fn test_margin_floors_and_never_reaches_zero() {
        assert_eq!(apply_margin(limit(100, 1000), 0.75).max_calls, 75);
        assert_eq!(apply_margin(limit(7, 1000), 0.5).max_calls, 3);
        assert_eq!(apply_margin(limit(1, 1000), 0.1).max_calls, 1);
        assert_eq!(apply_margin(limit(10, 1000), f64::NAN).max_calls, 1);
    }

    #[test]
    fn test_unknown_tier_falls_back_to_standard() {
        assert_eq!(RateLimitTier::parse_or_default("gold"), RateLimitTier::Standard);
        assert_eq!(RateLimitTier::parse_or_default(" VIP "), RateLimitTier::Vip);
    }

    #[test]
    fn test_explicit_limits_are_verbatim() {
        let settings = LimiterSettings {
            tier: Some(RateLimitTier::Free),
            ..LimiterSettings::explicit(3, Duration::from_secs(1))
        };
        let resolved = settings.resolve(RateLimit::default());
        assert_eq!(resolved.max_calls, 3);
        assert_eq!(resolved.window, Duration::from_secs(1));
    }

    #[test]
    fn test_declared_limit_scaled_without_tier() {
        let resolved = LimiterSettings::default().resolve(limit(60, 60_000));
        assert_eq!(resolved.max_calls, 48);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_wait() {
        let limiter = RateLimiter::new("TEST", limit(3, 1000));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.stats().total_waits, 0);

        limiter.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(1000), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(1050), "waited {:?}", waited);

        let stats = limiter.stats();
        assert_eq!(stats.total_calls, 4);
        assert_eq!(stats.total_waits, 1);
        assert!(stats.avg_wait_secs >= 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_never_exceed_window() {
        let limiter = Arc::new(RateLimiter::new("TEST", limit(5, 1000)));
        let grants = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..23 {
            let limiter = limiter.clone();
            let grants = grants.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                grants.lock().unwrap().push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut grants = grants.lock().unwrap().clone();
        grants.sort();
        assert_eq!(grants.len(), 23);
        for (i, start) in grants.iter().enumerate() {
            let in_window = grants[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < Duration::from_millis(1000))
                .count();
            assert!(in_window <= 5, "{} grants inside one window", in_window);
        }
        assert_eq!(limiter.stats().total_calls, 23);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_window_occupancy_decays() {
        let limiter = RateLimiter::new("TEST", limit(10, 1000));
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.stats().current_calls, 2);

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_eq!(limiter.stats().current_calls, 0);
        assert_eq!(limiter.stats().total_calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_stats_keeps_window() {
        let limiter = RateLimiter::new("TEST", limit(1, 1000));
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.reset_stats();

        let stats = limiter.stats();
        assert_eq!(stats.total_calls, 0);
        assert_eq!(stats.total_waits, 0);
        assert_eq!(stats.current_calls, 1);
    }

    #[test]
    fn test_registry_hands_out_shared_handles() {
        let registry = RateLimiterRegistry::new();
        let settings = LimiterSettings::explicit(3, Duration::from_secs(1));
        let a = registry.limiter_for("TUSHARE", RateLimit::default(), &settings);
        let b = registry.limiter_for("TUSHARE", RateLimit::default(), &LimiterSettings::default());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.limit().max_calls, 3);

        registry.limiter_for("EASTMONEY", RateLimit::default(), &LimiterSettings::default());
        let names: Vec<_> = registry.stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["EASTMONEY", "TUSHARE"]);
        assert!(registry.get("AKSHARE").is_none());
    }
}
