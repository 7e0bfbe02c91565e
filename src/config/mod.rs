//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, FetchConfig, LocalCacheConfig, LogFormat, LoggingConfig, PeriodicConfig,
    ServerConfig, StoreConfig,
};
