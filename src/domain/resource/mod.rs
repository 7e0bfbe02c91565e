//! Resource domain - producers of cacheable data

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::domain::DomainError;

/// A data producer whose results are cached by namespace + arguments
///
/// `fill` returning `Ok(None)` means "no value": it is handed back to the
/// caller but never stored.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    type Args: Serialize + Send + Sync + 'static;
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Identity of the resource, the first part of every cache key
    fn namespace(&self) -> &str;

    /// How long a filled value stays valid
    fn ttl(&self) -> Duration;

    /// Computes a fresh value
    async fn fill(&self, args: Self::Args) -> Result<Option<Self::Output>, DomainError>;
}

/// Resource built from a namespace, a TTL and a fill closure
pub struct FnResource<A, T, F> {
    namespace: String,
    ttl: Duration,
    fill: F,
    _marker: PhantomData<fn(A) -> T>,
}

impl<A, T, F> FnResource<A, T, F> {
    pub fn new(namespace: impl Into<String>, ttl: Duration, fill: F) -> Self {
        Self {
            namespace: namespace.into(),
            ttl,
            fill,
            _marker: PhantomData,
        }
    }
}

impl<A, T, F> fmt::Debug for FnResource<A, T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnResource")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[async_trait]
impl<A, T, F, Fut> Resource for FnResource<A, T, F>
where
    A: Serialize + Send + Sync + 'static,
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>, DomainError>> + Send + 'static,
{
    type Args = A;
    type Output = T;

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn fill(&self, args: A) -> Result<Option<T>, DomainError> {
        (self.fill)(args).await
    }
}
