//! In-process HTTP surface tests. Builds the router via `api_router()`
//! and drives it with `tower::ServiceExt::oneshot()` — no binary spawn,
//! no network port, no live database (the lazy pool never runs a query
//! in any of these paths).

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use ghostly_emg_core::api::{self, AppState};
use ghostly_emg_core::cache::AnalyticsCache;
use ghostly_emg_core::config;
use ghostly_emg_core::session::{FileSource, Orchestrator, OrchestratorError};
use ghostly_emg_core::store::ArtifactStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct UnreachableFileSource;

#[async_trait]
impl FileSource for UnreachableFileSource {
    async fn fetch(&self, _file_ref: &str) -> Result<Vec<u8>, OrchestratorError> {
        Err(OrchestratorError::ProcessingFailure {
            message: "not wired in this test".to_string(),
        })
    }
}

fn ensure_config() {
    if !config::is_initialized() {
        config::init(config::EmgConfig::default());
    }
}

fn test_state() -> AppState {
    ensure_config();
    let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/test").unwrap();
    let store = ArtifactStore::new(pool);
    AppState {
        orchestrator: Arc::new(Orchestrator::new(
            store.clone(),
            Arc::new(AnalyticsCache::new(Duration::from_secs(3600))),
            Arc::new(UnreachableFileSource),
        )),
        store,
        cache: Arc::new(AnalyticsCache::new(Duration::from_secs(3600))),
    }
}

#[tokio::test]
async fn health_endpoint_returns_200() {
    let app = api::api_router(test_state());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn analyze_rejects_garbage_bytes_as_bad_request() {
    let app = api::api_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/analyze")
                .body(Body::from(vec![0u8; 16]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn calibrate_rejects_garbage_bytes_as_bad_request() {
    let app = api::api_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/mvc/calibrate")
                .body(Body::from(vec![0u8; 16]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_status_rejects_malformed_uuid_before_touching_the_store() {
    let app = api::api_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/sessions/not-a-uuid/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_rejects_unrecognized_payload_shape() {
    let app = api::api_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/webhooks/storage")
                .body(Body::from("{\"nonsense\": true}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subjective_update_rejects_malformed_uuid_before_touching_the_store() {
    let app = api::api_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/sessions/not-a-uuid/subjective")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = api::api_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
