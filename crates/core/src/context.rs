//! Object graph of the running service, built once at startup.

use std::sync::Arc;

use log::info;

use marketsync_market_data::{
    ConsistencyChecker, EastmoneyProvider, MarketDataProvider, ProviderRegistry,
    RateLimiterRegistry, TushareProvider,
};

use crate::config::AppConfig;
use crate::errors::Result;
use crate::jobs::JobController;
use crate::store::DocumentStore;
use crate::sync::SyncOrchestrator;

/// Shared handles to every long-lived component.
pub struct ServiceContext {
    pub limiters: Arc<RateLimiterRegistry>,
    pub registry: Arc<ProviderRegistry>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub jobs: Arc<JobController>,
}

impl ServiceContext {
    /// Validate `config` and wire providers, limiters, orchestrator and jobs
    /// over `store`.
    pub fn build(config: &AppConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        config.validate()?;

        let limiters = Arc::new(RateLimiterRegistry::new());
        let providers = build_providers(config, &limiters);
        for provider in &providers {
            info!(
                "Provider {} configured (available: {})",
                provider.id(),
                provider.is_available()
            );
        }

        let registry = Arc::new(
            ProviderRegistry::with_priorities(
                providers,
                limiters.clone(),
                config.custom_priorities(),
            )
            .with_call_timeout(config.sync.call_timeout())
            .with_probe_days(config.sync.probe_days),
        );

        let orchestrator = Arc::new(
            SyncOrchestrator::new(
                registry.clone(),
                store,
                ConsistencyChecker::with_config(config.consistency.clone()),
            )
            .with_job_timeout(config.sync.job_timeout())
            .with_preferred_providers(config.sync.preferred_providers.clone()),
        );

        let jobs = Arc::new(JobController::new(
            orchestrator.clone(),
            &config.jobs,
            config.sync.history_limit,
        ));

        Ok(Self {
            limiters,
            registry,
            orchestrator,
            jobs,
        })
    }
}

/// Every configured adapter, each holding its limiter from `limiters`.
fn build_providers(
    config: &AppConfig,
    limiters: &RateLimiterRegistry,
) -> Vec<Arc<dyn MarketDataProvider>> {
    let tushare_config = &config.providers.tushare;
    let limiter = limiters.limiter_for(
        TushareProvider::ID,
        TushareProvider::DECLARED_LIMIT,
        &tushare_config.rate_limit.settings(),
    );
    let mut tushare = TushareProvider::new(tushare_config.token.clone(), limiter)
        .with_enabled(tushare_config.enabled);
    if let Some(base_url) = &tushare_config.base_url {
        tushare = tushare.with_base_url(base_url.as_str());
    }

    let eastmoney_config = &config.providers.eastmoney;
    let limiter = limiters.limiter_for(
        EastmoneyProvider::ID,
        EastmoneyProvider::DECLARED_LIMIT,
        &eastmoney_config.rate_limit.settings(),
    );
    let mut eastmoney = EastmoneyProvider::new(limiter).with_enabled(eastmoney_config.enabled);
    if let Some(base_url) = &eastmoney_config.base_url {
        eastmoney = eastmoney.with_base_url(base_url.as_str());
    }

    vec![Arc::new(tushare), Arc::new(eastmoney)]
}
