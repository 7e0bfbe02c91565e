//! Outbound HTTP: transport and the resilient fetcher built on it

mod fetcher;
mod http_client;

pub use fetcher::{FetcherConfig, ResilientFetcher};
pub use http_client::{HttpClient, HttpClientTrait};

#[cfg(test)]
pub use http_client::mock::MockHttpClient;
