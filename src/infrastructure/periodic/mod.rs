//! Periodically refreshed datasets

mod refresh_cache;
mod rest_source;

pub use refresh_cache::PeriodicRefreshCache;
pub use rest_source::RestDatasetSource;
