//! Cache trait definition

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::domain::DomainError;

const ALIVE_SENTINEL_KEY: &str = "__cache_alive__";

/// Key/value store with TTL support, shared by the shared store and the
/// process-local cache so either can back the same call sites
///
/// This trait uses strings internally to be dyn-compatible.
/// Use the `CacheExt` helpers for typed operations.
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    /// Gets a raw value from the cache
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Sets a raw value in the cache with a TTL
    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError>;

    /// Deletes a value from the cache
    async fn delete(&self, key: &str) -> Result<bool, DomainError>;

    /// Gets the remaining TTL for a key
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, DomainError>;

    /// Liveness probe: writes a sentinel and reads it back
    async fn health_check(&self) -> bool {
        let stamp = format!("{:?}", tokio::time::Instant::now());

        if self
            .set_raw(ALIVE_SENTINEL_KEY, &stamp, Duration::from_secs(5))
            .await
            .is_err()
        {
            return false;
        }

        matches!(self.get_raw(ALIVE_SENTINEL_KEY).await, Ok(Some(v)) if v == stamp)
    }
}

/// Extension trait providing typed operations
///
/// Structured values are JSON-encoded, plain strings are stored as-is. A value
/// that fails to deserialize is reported as a miss so the next fill overwrites it.
pub trait CacheExt: Cache {
    /// Gets a typed value from the cache
    fn get<'a, V>(
        &'a self,
        key: &'a str,
    ) -> impl std::future::Future<Output = Result<Option<V>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            match self.get_raw(key).await? {
                Some(data) => match serde_json::from_str::<V>(&data) {
                    Ok(value) => Ok(Some(value)),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Corrupt cache entry, treating as miss");
                        Ok(None)
                    }
                },
                None => Ok(None),
            }
        }
    }

    /// Sets a typed value in the cache with a TTL
    fn set<'a, V>(
        &'a self,
        key: &'a str,
        value: &'a V,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Send + Sync + ?Sized,
    {
        async move {
            validate_ttl(ttl)?;
            let data = serde_json::to_string(value).map_err(|e| {
                DomainError::serialization(format!("Failed to serialize cache value: {}", e))
            })?;
            self.set_raw(key, &data, ttl).await
        }
    }

    /// Gets a plain string stored without JSON encoding
    fn get_string<'a>(
        &'a self,
        key: &'a str,
    ) -> impl std::future::Future<Output = Result<Option<String>, DomainError>> + Send {
        self.get_raw(key)
    }

    /// Stores a plain string without JSON encoding
    fn set_string<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send {
        async move {
            validate_ttl(ttl)?;
            self.set_raw(key, value, ttl).await
        }
    }

    /// Gets a list of typed values
    fn get_list<'a, V>(
        &'a self,
        key: &'a str,
    ) -> impl std::future::Future<Output = Result<Option<Vec<V>>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        self.get::<Vec<V>>(key)
    }

    /// Stores a list of typed values
    fn set_list<'a, V>(
        &'a self,
        key: &'a str,
        values: &'a [V],
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        self.set(key, values, ttl)
    }

    /// Gets a string-keyed dictionary of typed values
    fn get_dict<'a, V>(
        &'a self,
        key: &'a str,
    ) -> impl std::future::Future<Output = Result<Option<HashMap<String, V>>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        self.get::<HashMap<String, V>>(key)
    }

    /// Stores a string-keyed dictionary of typed values
    fn set_dict<'a, V>(
        &'a self,
        key: &'a str,
        values: &'a HashMap<String, V>,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        self.set(key, values, ttl)
    }
}

// Blanket implementation for all types implementing Cache
impl<T: Cache + ?Sized> CacheExt for T {}

/// TTLs must be at least one second, the shared store's resolution
pub fn validate_ttl(ttl: Duration) -> Result<(), DomainError> {
    if ttl.is_zero() {
        return Err(DomainError::validation("Cache TTL must be positive"));
    }
    Ok(())
}
