//! Check command - probes the configured store and local cache

use tracing::info;

use crate::api::health::{check_readiness, HealthResponse, HealthStatus};
use crate::CacheContext;

/// Run the probes once and fail when the shared store is not usable
pub async fn run() -> anyhow::Result<()> {
    let config = super::bootstrap();

    let context = CacheContext::from_config(&config).await?;
    let report = check_readiness(&context).await;

    for check in report.checks.iter().flatten() {
        info!(
            component = %check.name,
            status = ?check.status,
            message = check.message.as_deref().unwrap_or(""),
            latency_ms = check.latency_ms.unwrap_or(0),
            "Probe finished"
        );
    }

    verdict(&report)
}

fn verdict(report: &HealthResponse) -> anyhow::Result<()> {
    let store_ok = report
        .check("shared_store")
        .is_some_and(|c| c.status == HealthStatus::Healthy);

    if !store_ok {
        anyhow::bail!("Shared store is unhealthy");
    }
    if report.status == HealthStatus::Unhealthy {
        anyhow::bail!("Local cache is unhealthy");
    }

    info!(status = ?report.status, "All probes passed");
    Ok(())
}
