//! HTTP surface: synchronous upload, webhook ingest, and derived-data
//! queries, assembled via `create_app()` — layered middleware outside,
//! state injected via `with_state`.

mod envelope;
mod file_source;
mod status;
mod upload;
mod webhook;

pub use envelope::{ApiErrorResponse, ApiResponse};
pub use file_source::HttpFileSource;

use crate::cache::AnalyticsCache;
use crate::session::Orchestrator;
use crate::store::ArtifactStore;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: ArtifactStore,
    pub cache: Arc<AnalyticsCache>,
}

/// Assembles every route, with state injected but before the outer
/// middleware stack — kept separate from [`create_app`] so tests can
/// drive it directly with `oneshot` without needing a real peer
/// address for the rate limiter to key on.
pub fn api_router(state: AppState) -> Router {
    let stateless_routes = Router::new()
        .route("/analyze", post(upload::analyze))
        .route("/mvc/calibrate", post(status::calibrate));

    let stateful_routes = Router::new()
        .route("/webhooks/storage", post(webhook::receive))
        .route("/sessions/{id}/status", get(status::get_status))
        .route("/sessions/{id}/analytics", get(status::get_analytics))
        .route("/sessions/{id}/recalculate", post(status::recalculate))
        .route("/sessions/{id}/subjective", post(status::record_subjective_outcomes))
        .with_state(state);

    Router::new()
        .nest("/api/v1", stateless_routes.merge(stateful_routes))
        .route("/health", get(health))
}

pub fn create_app(state: AppState) -> Router {
    let cfg = crate::config::get();

    // Rate limiting: 20 req/s sustained, burst up to 50 per IP.
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(20)
            .burst_size(50)
            .finish()
            .expect("valid governor config"),
    );

    api_router(state)
        .layer(GovernorLayer { config: governor_config })
        .layer(RequestBodyLimitLayer::new(cfg.max_file_size_bytes as usize))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FileSource;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;
    use tower::ServiceExt;

    struct NullFileSource;

    #[async_trait]
    impl FileSource for NullFileSource {
        async fn fetch(&self, _file_ref: &str) -> Result<Vec<u8>, crate::session::OrchestratorError> {
            Err(crate::session::OrchestratorError::ProcessingFailure {
                message: "not wired in this test".to_string(),
            })
        }
    }

    fn test_state() -> AppState {
        // lazy pool: never connected against in these router-shape tests.
        let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/test").unwrap();
        let store = ArtifactStore::new(pool);
        AppState {
            orchestrator: Arc::new(Orchestrator::new(
                store.clone(),
                Arc::new(AnalyticsCache::new(Duration::from_secs(3600))),
                Arc::new(NullFileSource),
            )),
            store,
            cache: Arc::new(AnalyticsCache::new(Duration::from_secs(3600))),
        }
    }

    #[tokio::test]
    async fn health_route_responds_ok() {
        let app = api_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
