//! Domain layer - Contracts and value types of the cache and fetch core

pub mod cache;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod resource;

pub use cache::{Cache, CacheExt, CacheKey, CacheKeyParams};
pub use dataset::{DatasetSource, PeriodicDataset};
pub use error::DomainError;
pub use fetch::{FetchOptions, HttpMethod, HttpResponse, RestRequest};
pub use resource::{FnResource, Resource};
