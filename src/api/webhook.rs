//! Webhook-triggered ingest: verify signature, normalize payload, run
//! the ordered validation gates, then hand off to the orchestrator and
//! process asynchronously.

use super::envelope::{ApiErrorResponse, ApiResponse};
use super::AppState;
use crate::session::webhook::{self, WebhookPayload};
use crate::session::CreateSessionRequest;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use std::sync::Arc;
use tracing::{info, warn};

const SIGNATURE_HEADER: &str = "x-signature";

/// `POST /webhooks/storage` — body is the raw event JSON; the HMAC
/// signature, when `webhook_secret` is configured, is verified over
/// these exact bytes before anything is deserialized.
pub async fn receive(State(state): State<AppState>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    let cfg = crate::config::get();

    if let Some(secret) = &cfg.webhook_secret {
        let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
            return ApiErrorResponse::unauthorized("missing signature header");
        };
        if webhook::verify_signature(secret, &body, signature).is_err() {
            return ApiErrorResponse::unauthorized("signature verification failed");
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => return ApiErrorResponse::bad_request(format!("unrecognized webhook payload: {e}")),
    };

    let event = webhook::normalize(&payload);
    if let Err(e) = webhook::validate(&event, &cfg.ingest_bucket, cfg.max_file_size_bytes) {
        return ApiResponse::with_status(
            axum::http::StatusCode::OK,
            serde_json::json!({"success": false, "message": e.to_string()}),
        );
    }

    let file_ref = format!("{}/{}", event.bucket, event.object_name);
    let session_id = match state
        .orchestrator
        .create_session(CreateSessionRequest {
            file_ref: &file_ref,
            patient_id: None,
            therapist_id: None,
        })
        .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "create_session failed for webhook event");
            return ApiErrorResponse::internal(e.to_string());
        }
    };

    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        if let Err(e) = orchestrator.process_session(session_id).await {
            warn!(%session_id, error = %e, "async session processing failed");
        } else {
            info!(%session_id, "async session processing succeeded");
        }
    });

    ApiResponse::ok(serde_json::json!({
        "success": true,
        "message": "accepted",
        "processing_id": session_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_header_name_is_lowercase() {
        assert_eq!(SIGNATURE_HEADER, "x-signature");
    }
}
