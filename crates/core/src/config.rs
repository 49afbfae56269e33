//! Application configuration.
//!
//! Configuration is a TOML document. Every section has defaults, so an empty
//! file (or no file at all) yields a working setup with the keyless provider
//! only. A handful of environment variables override file values:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `MARKETSYNC_CONFIG` | Path of the TOML file |
//! | `MARKETSYNC_TUSHARE_TOKEN` | Tushare API token |
//! | `MARKETSYNC_TUSHARE_TIER` | Tushare account tier (`free` … `vip`) |

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use marketsync_market_data::{ConsistencyConfig, LimiterSettings, RateLimitTier};

use crate::errors::ConfigError;

pub const CONFIG_PATH_ENV: &str = "MARKETSYNC_CONFIG";
pub const TUSHARE_TOKEN_ENV: &str = "MARKETSYNC_TUSHARE_TOKEN";
pub const TUSHARE_TIER_ENV: &str = "MARKETSYNC_TUSHARE_TIER";

/// Config file read when `MARKETSYNC_CONFIG` is unset, if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "marketsync.toml";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    pub consistency: ConsistencyConfig,
    pub sync: SyncConfig,
    pub jobs: JobsConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub tushare: ProviderConfig,
    pub eastmoney: ProviderConfig,
}

/// Settings shared by every provider section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub enabled: bool,
    /// API token, for providers that need one
    pub token: Option<String>,
    /// Overrides the provider's own priority; lower runs first
    pub priority: Option<i32>,
    pub base_url: Option<String>,
    pub rate_limit: RateLimitConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: None,
            priority: None,
            base_url: None,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Account tier name; unknown names fall back to `standard`
    pub tier: Option<String>,
    pub safety_margin: f64,
    /// Explicit limit, used verbatim together with `window_secs`
    pub max_calls: Option<u32>,
    pub window_secs: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tier: None,
            safety_margin: marketsync_market_data::registry::DEFAULT_SAFETY_MARGIN,
            max_calls: None,
            window_secs: None,
        }
    }
}

impl RateLimitConfig {
    pub fn settings(&self) -> LimiterSettings {
        LimiterSettings {
            tier: self.tier.as_deref().map(RateLimitTier::parse_or_default),
            safety_margin: self.safety_margin,
            max_calls: self.max_calls,
            window: self.window_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Timeout of a single provider call
    pub call_timeout_secs: u64,
    /// Timeout of a job's whole fetch step
    pub job_timeout_secs: u64,
    /// Run outcomes kept per job
    pub history_limit: usize,
    /// Days the latest-trade-date probe walks back
    pub probe_days: u32,
    /// Providers to try first, in order
    pub preferred_providers: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 30,
            job_timeout_secs: 600,
            history_limit: 50,
            probe_days: marketsync_market_data::DEFAULT_PROBE_DAYS,
            preferred_providers: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub stock_roster_sync: JobConfig,
    pub daily_metrics_sync: JobConfig,
    pub provider_liveness_check: JobConfig,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            stock_roster_sync: JobConfig::every(24 * 60 * 60, 10),
            daily_metrics_sync: JobConfig::every(60 * 60, 30),
            provider_liveness_check: JobConfig::every(5 * 60, 0),
        }
    }
}

/// Schedule of one job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Delay before the first scheduled run
    pub initial_delay_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self::every(60 * 60, 0)
    }
}

impl JobConfig {
    pub fn every(interval_secs: u64, initial_delay_secs: u64) -> Self {
        Self {
            enabled: true,
            interval_secs,
            initial_delay_secs,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

impl AppConfig {
    /// Load configuration from the file named by `MARKETSYNC_CONFIG`, or from
    /// `marketsync.toml` when present, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)?
            }
            Err(_) => {
                info!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(TUSHARE_TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            debug!("Tushare token taken from {}", TUSHARE_TOKEN_ENV);
            self.providers.tushare.token = Some(token);
        }
        if let Some(tier) = lookup(TUSHARE_TIER_ENV).filter(|t| !t.trim().is_empty()) {
            debug!("Tushare tier '{}' taken from {}", tier, TUSHARE_TIER_ENV);
            self.providers.tushare.rate_limit.tier = Some(tier);
        }
    }

    /// Custom priorities keyed by provider id.
    pub fn custom_priorities(&self) -> HashMap<String, i32> {
        [
            ("TUSHARE", self.providers.tushare.priority),
            ("EASTMONEY", self.providers.eastmoney.priority),
        ]
        .into_iter()
        .filter_map(|(id, priority)| priority.map(|p| (id.to_string(), p)))
        .collect()
    }

    /// Reject values the service cannot run with. All problems are reported
    /// together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = self.consistency.problems();

        if self.sync.call_timeout_secs == 0 {
            problems.push("sync.call_timeout_secs must be positive".to_string());
        }
        if self.sync.job_timeout_secs == 0 {
            problems.push("sync.job_timeout_secs must be positive".to_string());
        }
        if self.sync.history_limit == 0 {
            problems.push("sync.history_limit must be positive".to_string());
        }

        for (name, job) in [
            ("stock_roster_sync", &self.jobs.stock_roster_sync),
            ("daily_metrics_sync", &self.jobs.daily_metrics_sync),
            ("provider_liveness_check", &self.jobs.provider_liveness_check),
        ] {
            if job.interval_secs == 0 {
                problems.push(format!("jobs.{}.interval_secs must be positive", name));
            }
        }

        for (name, provider) in [
            ("tushare", &self.providers.tushare),
            ("eastmoney", &self.providers.eastmoney),
        ] {
            let limit = &provider.rate_limit;
            if !(limit.safety_margin > 0.0 && limit.safety_margin <= 1.0) {
                problems.push(format!(
                    "providers.{}.rate_limit.safety_margin must be within (0, 1], got {}",
                    name, limit.safety_margin
                ));
            }
            if limit.max_calls.is_some() != limit.window_secs.is_some() {
                problems.push(format!(
                    "providers.{}.rate_limit.max_calls and window_secs must be set together",
                    name
                ));
            }
            if limit.max_calls == Some(0) || limit.window_secs == Some(0) {
                problems.push(format!(
                    "providers.{}.rate_limit limits must be positive",
                    name
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}
