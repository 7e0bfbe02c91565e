//! Observability infrastructure - Metrics

mod config;
mod metrics;

pub use config::MetricsConfig;
pub use metrics::{
    create_metrics_router, init_metrics, record_cache_lookup, record_fill, record_fill_join,
    record_periodic_refresh, record_upstream_request, record_upstream_retry,
    record_upstream_shared, record_upstream_rate_limited, CacheLookup, PrometheusMetrics,
};
