//! Chain Index Cache
//!
//! The caching and resilient-fetch layer of a chain indexing backend:
//! - Cache-aside resources over a shared store (Redis or in-memory)
//! - Single-flight fills and upstream requests
//! - Rate-limit cooldown and exponential backoff for upstream RPC/REST nodes
//! - Periodically refreshed, stale-while-revalidate datasets

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use config::{FetchConfig, LocalCacheConfig, StoreConfig};
use domain::{Cache, DomainError, FetchOptions, Resource};
use infrastructure::cache::{CacheConfig, CacheFactory, CacheType, InMemoryCache, InMemoryCacheConfig};
use infrastructure::http::{FetcherConfig, HttpClient, ResilientFetcher};
use infrastructure::periodic::{PeriodicRefreshCache, RestDatasetSource};
use infrastructure::resource::ResourceCache;

/// Dataset id of the known chain identifiers
pub const CHAINS_DATASET: &str = "chains";

/// Periodic cache of the known chain identifiers
pub type ChainsCache = PeriodicRefreshCache<RestDatasetSource<String>>;

/// The core services, constructed once at startup and handed to every consumer
#[derive(Debug, Clone)]
pub struct CacheContext {
    /// Store shared by every process of the deployment
    pub store: Arc<dyn Cache>,
    /// Short-TTL cache private to this process
    pub local: Arc<InMemoryCache>,
    pub fetcher: Arc<ResilientFetcher>,
    /// Present when a chain registry URL is configured
    pub chains: Option<ChainsCache>,
}

impl CacheContext {
    pub fn new(store: Arc<dyn Cache>, local: Arc<InMemoryCache>, fetcher: Arc<ResilientFetcher>) -> Self {
        Self {
            store,
            local,
            fetcher,
            chains: None,
        }
    }

    pub fn with_chains(mut self, chains: ChainsCache) -> Self {
        self.chains = Some(chains);
        self
    }

    /// Builds every service from configuration
    pub async fn from_config(config: &AppConfig) -> Result<Self, DomainError> {
        let factory = CacheFactory::new();

        let store = factory.create(&cache_config(&config.store)?).await?;
        let local = factory.create_in_memory_with_config(local_cache_config(&config.local_cache));

        let fetcher_config = fetcher_config(&config.fetch);
        let client = HttpClient::with_timeout(fetcher_config.attempt_timeout)?;
        let fetcher = ResilientFetcher::new(Arc::new(client), fetcher_config)
            .map_err(|e| DomainError::configuration(format!("Invalid fetch settings: {}", e)))?;
        let fetcher = Arc::new(fetcher);

        let mut context = Self::new(store, local, Arc::clone(&fetcher));

        if let Some(url) = &config.periodic.chains_url {
            let source = RestDatasetSource::new(fetcher).with_dataset(CHAINS_DATASET, url.clone());
            let interval = Duration::from_secs(config.periodic.refresh_interval_secs);

            info!(url = %url, interval_secs = interval.as_secs(), "Chains dataset enabled");
            let chains = PeriodicRefreshCache::new(source, interval).map_err(|e| {
                DomainError::configuration(format!("Invalid periodic settings: {}", e))
            })?;
            context = context.with_chains(chains);
        }

        Ok(context)
    }

    /// Cache-aside wrapper for `resource` over the shared store
    pub fn resource_cache<R: Resource>(&self, resource: R) -> Result<ResourceCache<R>, DomainError> {
        ResourceCache::new(resource, Arc::clone(&self.store))
    }

    /// Cache-aside wrapper for `resource` over the process-local cache
    pub fn local_resource_cache<R: Resource>(&self, resource: R) -> Result<ResourceCache<R>, DomainError> {
        let local: Arc<dyn Cache> = self.local.clone();
        ResourceCache::new(resource, local)
    }
}

pub fn cache_config(store: &StoreConfig) -> Result<CacheConfig, DomainError> {
    let mut cache_config = match CacheType::from_str(&store.backend)? {
        CacheType::InMemory => CacheConfig::in_memory(),
        CacheType::Redis => {
            let url = store.redis_url.clone().ok_or_else(|| {
                DomainError::configuration("store.redis_url is required when store.backend is redis")
            })?;
            CacheConfig::redis(url)
        }
    };

    if let Some(prefix) = &store.key_prefix {
        cache_config = cache_config.with_key_prefix(prefix.clone());
    }

    Ok(cache_config.with_connection_timeout(Duration::from_secs(store.connection_timeout_secs)))
}

pub fn local_cache_config(local: &LocalCacheConfig) -> InMemoryCacheConfig {
    InMemoryCacheConfig::default().with_max_capacity(local.max_capacity)
}

pub fn fetcher_config(fetch: &FetchConfig) -> FetcherConfig {
    let defaults = FetchOptions::new(fetch.retries)
        .with_backoff_factor(fetch.backoff_factor)
        .with_min_delay(fetch.min_delay_ms)
        .with_max_delay(fetch.max_delay_ms);

    FetcherConfig::default()
        .with_defaults(defaults)
        .with_attempt_timeout(Duration::from_millis(fetch.attempt_timeout_ms))
        .with_cooldown(Duration::from_secs(fetch.cooldown_secs))
        .with_rate_limit_retries(fetch.rate_limit_retries)
}
