//! Prometheus metrics infrastructure

use std::sync::Arc;

use axum::{Router, extract::State, response::IntoResponse, routing::get};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use super::config::MetricsConfig;

/// Prometheus metrics handle for serving metrics endpoint
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Get the metrics as a string for the /metrics endpoint
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Initialize Prometheus metrics
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("chain_index_cache_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);

            tracing::info!("Prometheus metrics initialized at {}", config.path);

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

/// Create the metrics router
pub fn create_metrics_router(metrics: PrometheusMetrics, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    metrics.render()
}

/// Result of looking a key up in the shared store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    Hit,
    Miss,
    Error,
}

impl CacheLookup {
    fn as_str(&self) -> &'static str {
        match self {
            CacheLookup::Hit => "hit",
            CacheLookup::Miss => "miss",
            CacheLookup::Error => "error",
        }
    }
}

pub fn record_cache_lookup(namespace: &str, lookup: CacheLookup) {
    counter!(
        "cache_lookups_total",
        "namespace" => namespace.to_string(),
        "result" => lookup.as_str()
    )
    .increment(1);
}

pub fn record_fill(namespace: &str, success: bool) {
    counter!(
        "cache_fills_total",
        "namespace" => namespace.to_string(),
        "outcome" => outcome(success)
    )
    .increment(1);
}

/// A caller awaited a fill another caller had already started
pub fn record_fill_join(namespace: &str) {
    counter!("cache_fill_joins_total", "namespace" => namespace.to_string()).increment(1);
}

pub fn record_upstream_request(success: bool) {
    counter!("upstream_requests_total", "outcome" => outcome(success)).increment(1);
}

pub fn record_upstream_retry() {
    counter!("upstream_retries_total").increment(1);
}

pub fn record_upstream_rate_limited() {
    counter!("upstream_rate_limited_total").increment(1);
}

/// A caller reused an outbound request already in flight
pub fn record_upstream_shared() {
    counter!("upstream_shared_requests_total").increment(1);
}

pub fn record_periodic_refresh(dataset: &str, success: bool) {
    counter!(
        "periodic_refreshes_total",
        "dataset" => dataset.to_string(),
        "outcome" => outcome(success)
    )
    .increment(1);
}

fn outcome(success: bool) -> &'static str {
    if success { "success" } else { "error" }
}
