use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::DomainError;
use crate::domain::dataset::DatasetSource;
use crate::domain::fetch::{FetchOptions, RestRequest};
use crate::infrastructure::http::ResilientFetcher;

#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    /// JSON pointer to the array inside the response, `None` for a bare array
    pointer: Option<String>,
}

/// Loads datasets as JSON arrays from REST endpoints
pub struct RestDatasetSource<T> {
    fetcher: Arc<ResilientFetcher>,
    endpoints: HashMap<String, Endpoint>,
    options: FetchOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for RestDatasetSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestDatasetSource")
            .field("endpoints", &self.endpoints)
            .field("options", &self.options)
            .finish()
    }
}

impl<T> RestDatasetSource<T> {
    pub fn new(fetcher: Arc<ResilientFetcher>) -> Self {
        let options = fetcher.config().defaults.clone();

        Self {
            fetcher,
            endpoints: HashMap::new(),
            options,
            _marker: PhantomData,
        }
    }

    /// Registers a dataset whose endpoint answers with a bare JSON array
    pub fn with_dataset(mut self, dataset_id: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(
            dataset_id.into(),
            Endpoint {
                url: url.into(),
                pointer: None,
            },
        );
        self
    }

    /// Registers a dataset whose array sits at `pointer` (e.g. `/chains`) in the response
    pub fn with_dataset_at(
        mut self,
        dataset_id: impl Into<String>,
        url: impl Into<String>,
        pointer: impl Into<String>,
    ) -> Self {
        self.endpoints.insert(
            dataset_id.into(),
            Endpoint {
                url: url.into(),
                pointer: Some(pointer.into()),
            },
        );
        self
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dataset_ids(&self) -> Vec<String> {
        self.endpoints.keys().cloned().collect()
    }
}

#[async_trait]
impl<T> DatasetSource for RestDatasetSource<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Item = T;

    async fn load(&self, dataset_id: &str) -> Result<Vec<T>, DomainError> {
        let endpoint = self.endpoints.get(dataset_id).ok_or_else(|| {
            DomainError::validation(format!("Unknown dataset '{}'", dataset_id))
        })?;

        let mut payload = self
            .fetcher
            .fetch(&endpoint.url, &RestRequest::get(), &self.options)
            .await?;

        let array = match &endpoint.pointer {
            Some(pointer) => payload.pointer_mut(pointer).map(Value::take).ok_or_else(|| {
                DomainError::serialization(format!(
                    "Response from '{}' has nothing at '{}'",
                    endpoint.url, pointer
                ))
            })?,
            None => payload,
        };

        serde_json::from_value(array).map_err(|e| {
            DomainError::serialization(format!(
                "Dataset '{}' from '{}' is not a list of the expected items: {}",
                dataset_id, endpoint.url, e
            ))
        })
    }
}
