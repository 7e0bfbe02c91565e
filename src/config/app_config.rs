use serde::Deserialize;

use crate::infrastructure::observability::MetricsConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub local_cache: LocalCacheConfig,
    pub fetch: FetchConfig,
    pub periodic: PeriodicConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Shared store selection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `in_memory` or `redis`
    pub backend: String,
    pub redis_url: Option<String>,
    pub key_prefix: Option<String>,
    pub connection_timeout_secs: u64,
}

/// Process-local cache sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalCacheConfig {
    pub max_capacity: u64,
}

/// Outbound fetch defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub retries: u32,
    pub backoff_factor: f64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempt_timeout_ms: u64,
    pub cooldown_secs: u64,
    pub rate_limit_retries: u32,
}

/// Periodic dataset refresh
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PeriodicConfig {
    pub refresh_interval_secs: u64,
    /// Endpoint answering with the JSON array of known chain identifiers
    pub chains_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "in_memory".to_string(),
            redis_url: None,
            key_prefix: None,
            connection_timeout_secs: 5,
        }
    }
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff_factor: 2.0,
            min_delay_ms: 500,
            max_delay_ms: 10_000,
            attempt_timeout_ms: 10_000,
            cooldown_secs: 60,
            rate_limit_retries: 3,
        }
    }
}

impl Default for PeriodicConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 300,
            chains_url: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
