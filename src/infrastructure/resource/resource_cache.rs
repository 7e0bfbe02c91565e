//! Cache-aside engine for resources

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::cache::{validate_ttl, Cache, CacheExt, CacheKey};
use crate::domain::resource::Resource;
use crate::domain::DomainError;
use crate::infrastructure::observability::{
    record_cache_lookup, record_fill, record_fill_join, CacheLookup,
};
use crate::infrastructure::single_flight::{FlightRole, SingleFlight};

/// Serves a resource's values from the store, filling on miss or expiry
///
/// At most one fill runs per cache key within the process; concurrent callers
/// for that key await the same outcome. A store that cannot be read or written
/// degrades to fill-without-caching instead of failing the caller.
pub struct ResourceCache<R: Resource> {
    resource: Arc<R>,
    store: Arc<dyn Cache>,
    fills: SingleFlight<Option<R::Output>>,
}

impl<R: Resource> fmt::Debug for ResourceCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("namespace", &self.resource.namespace())
            .field("ttl", &self.resource.ttl())
            .field("store", &self.store)
            .field("fills", &self.fills)
            .finish()
    }
}

impl<R: Resource> ResourceCache<R> {
    pub fn new(resource: R, store: Arc<dyn Cache>) -> Result<Self, DomainError> {
        Self::from_arc(Arc::new(resource), store)
    }

    pub fn from_arc(resource: Arc<R>, store: Arc<dyn Cache>) -> Result<Self, DomainError> {
        validate_ttl(resource.ttl())?;
        CacheKey::new(resource.namespace(), &())?;

        Ok(Self {
            resource,
            store,
            fills: SingleFlight::new(),
        })
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Key under which the value for `args` is stored
    pub fn key_for(&self, args: &R::Args) -> Result<CacheKey, DomainError> {
        CacheKey::new(self.resource.namespace(), args)
    }

    /// Returns the cached value for `args`, or fills, stores and returns a fresh one
    pub async fn fetch(&self, args: R::Args) -> Result<Option<R::Output>, DomainError> {
        let key = self.key_for(&args)?;
        let namespace = self.resource.namespace();

        let store_readable = match self.store.get::<R::Output>(key.as_str()).await {
            Ok(Some(value)) => {
                debug!(key = %key, "Cache hit");
                record_cache_lookup(namespace, CacheLookup::Hit);
                return Ok(Some(value));
            }
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                record_cache_lookup(namespace, CacheLookup::Miss);
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Store read failed, filling without cache");
                record_cache_lookup(namespace, CacheLookup::Error);
                false
            }
        };

        let resource = Arc::clone(&self.resource);
        let store = Arc::clone(&self.store);
        let fill_key = key.clone();

        let (outcome, role) = self.fills.join_or_start(key.as_str(), move || async move {
            let namespace = resource.namespace();

            // A flight that settled after our miss may already have stored the value
            if store_readable {
                if let Ok(Some(value)) = store.get::<R::Output>(fill_key.as_str()).await {
                    debug!(key = %fill_key, "Filled by a previous flight");
                    return Ok(Some(value));
                }
            }

            let filled = resource.fill(args).await;
            record_fill(namespace, filled.is_ok());

            let value = filled?;

            if let Some(value) = &value {
                if let Err(e) = store.set(fill_key.as_str(), value, resource.ttl()).await {
                    warn!(
                        key = %fill_key,
                        error = %e,
                        "Store write failed, returning uncached value"
                    );
                }
            }

            Ok(value)
        });

        if role == FlightRole::Follower {
            debug!(key = %key, "Joining in-flight fill");
            record_fill_join(namespace);
        }

        outcome.await
    }

    /// Drops the stored value for `args`; the next fetch fills again
    pub async fn invalidate(&self, args: &R::Args) -> Result<bool, DomainError> {
        let key = self.key_for(args)?;
        self.store.delete(key.as_str()).await
    }

    /// Remaining lifetime of the stored value for `args`, if any
    pub async fn remaining_ttl(&self, args: &R::Args) -> Result<Option<Duration>, DomainError> {
        let key = self.key_for(args)?;
        self.store.ttl(key.as_str()).await
    }

    /// Whether a fill for `args` is currently running in this process
    pub fn is_filling(&self, args: &R::Args) -> Result<bool, DomainError> {
        let key = self.key_for(args)?;
        Ok(self.fills.is_in_flight(key.as_str()))
    }
}
