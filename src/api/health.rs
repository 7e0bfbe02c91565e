//! Health check endpoints for Kubernetes probes

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::domain::Cache;
use crate::{CHAINS_DATASET, CacheContext};

use super::state::AppState;

/// Detailed health response with component status
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<HealthCheck>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Health check status
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health check
#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl HealthResponse {
    pub fn check(&self, name: &str) -> Option<&HealthCheck> {
        self.checks.as_ref()?.iter().find(|c| c.name == name)
    }
}

/// Simple health check - returns 200 if the service is running
pub async fn health_check() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: None,
        latency_ms: None,
    };

    (StatusCode::OK, Json(response))
}

/// Readiness check with dependency verification
pub async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = check_readiness(&state.context).await;

    let status_code = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK, // Still serving, uncached or stale
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response))
}

/// Probes every component of the context
///
/// An unreachable shared store only degrades the service: fills still run,
/// they just are not cached. A broken process-local cache makes it unhealthy.
pub async fn check_readiness(context: &CacheContext) -> HealthResponse {
    let start = Instant::now();
    let mut checks = Vec::new();

    checks.push(check_cache("shared_store", context.store.as_ref(), HealthStatus::Degraded).await);
    checks.push(check_cache("local_cache", context.local.as_ref(), HealthStatus::Unhealthy).await);

    if let Some(chains) = &context.chains {
        let check = match chains.snapshot(CHAINS_DATASET) {
            Some(items) => HealthCheck {
                name: "chains_dataset".to_string(),
                status: HealthStatus::Healthy,
                message: Some(format!("{} items", items.len())),
                latency_ms: None,
            },
            None => HealthCheck {
                name: "chains_dataset".to_string(),
                status: HealthStatus::Degraded,
                message: Some("not loaded yet".to_string()),
                latency_ms: None,
            },
        };
        checks.push(check);
    }

    let status = overall_status(&checks);

    HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: Some(checks),
        latency_ms: Some(start.elapsed().as_millis() as u64),
    }
}

async fn check_cache(name: &str, cache: &dyn Cache, on_failure: HealthStatus) -> HealthCheck {
    let start = Instant::now();
    let alive = cache.health_check().await;

    HealthCheck {
        name: name.to_string(),
        status: if alive { HealthStatus::Healthy } else { on_failure },
        message: (!alive).then(|| "round-trip failed".to_string()),
        latency_ms: Some(start.elapsed().as_millis() as u64),
    }
}

fn overall_status(checks: &[HealthCheck]) -> HealthStatus {
    if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if checks.iter().any(|c| c.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
