use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::infrastructure::observability::{create_metrics_router, PrometheusMetrics};

use super::health;
use super::state::AppState;
use super::v1;

/// Create the full router with application state
pub fn create_router(state: AppState, metrics: Option<PrometheusMetrics>, metrics_path: &str) -> Router {
    let mut router = Router::new()
        // Health endpoints
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        // Data endpoints
        .nest("/v1", v1::create_v1_router())
        .with_state(state);

    if let Some(metrics) = metrics {
        router = router.merge(create_metrics_router(metrics, metrics_path));
    }

    router.layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheContext;
    use crate::domain::cache::MockCache;
    use crate::infrastructure::cache::InMemoryCache;
    use crate::infrastructure::http::{FetcherConfig, MockHttpClient, ResilientFetcher};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let fetcher =
            ResilientFetcher::new(Arc::new(MockHttpClient::new()), FetcherConfig::default()).unwrap();

        AppState::new(CacheContext::new(
            Arc::new(MockCache::new()),
            Arc::new(InMemoryCache::new()),
            Arc::new(fetcher),
        ))
    }

    async fn status_of(router: Router, uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        router.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_routes() {
        let router = create_router(state(), None, "/metrics");

        assert_eq!(status_of(router.clone(), "/health").await, StatusCode::OK);
        assert_eq!(status_of(router.clone(), "/ready").await, StatusCode::OK);
        assert_eq!(status_of(router.clone(), "/v1/chains").await, StatusCode::NOT_FOUND);
        assert_eq!(status_of(router, "/metrics").await, StatusCode::NOT_FOUND);
    }
}
