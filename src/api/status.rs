//! Derived-data queries: session status, analytics (cache-first,
//! store-fallback), on-demand recalculation, and MVC calibration.

use super::envelope::{ApiErrorResponse, ApiResponse};
use super::AppState;
use crate::mvc;
use crate::scoring;
use crate::session::Orchestrator;
use crate::{c3d, signal};
use axum::extract::{Json, Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use uuid::Uuid;

/// `GET /sessions/{id}/status`
pub async fn get_status(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.store.sessions.get(id).await {
        Ok(session) => ApiResponse::ok(serde_json::json!({
            "session_id": session.id,
            "session_code": session.session_code,
            "status": session.status,
            "processing_error": session.processing_error,
            "created_at": session.created_at,
            "updated_at": session.updated_at,
        })),
        Err(e) => ApiErrorResponse::from_store_error(&e),
    }
}

/// `GET /sessions/{id}/analytics` — cache-first, falling back to the
/// artifact store on a cache miss or an expired entry.
pub async fn get_analytics(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    if let Some(entry) = state.cache.get(id) {
        return ApiResponse::ok(serde_json::json!({
            "session_id": id,
            "source": "cache",
            "analytics": entry.analytics,
            "summary": entry.summary,
        }));
    }

    match state.store.channels.load_by_session(id).await {
        Ok(channels) if channels.is_empty() => {
            ApiErrorResponse::not_found(format!("no analytics recorded for session {id}"))
        }
        Ok(channels) => ApiResponse::ok(serde_json::json!({
            "session_id": id,
            "source": "store",
            "analytics": channels,
        })),
        Err(e) => ApiErrorResponse::from_store_error(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RecalculateOptions {
    pub mvc_amplitude_threshold: Option<f64>,
    pub duration_threshold_ms: Option<f64>,
}

/// `POST /sessions/{id}/recalculate` — reclassifies stored contractions
/// under new thresholds without re-parsing the source file.
pub async fn recalculate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(options): Query<RecalculateOptions>,
) -> Response {
    let existing = match state.store.channels.load_by_session(id).await {
        Ok(channels) if channels.is_empty() => {
            return ApiErrorResponse::not_found(format!("no analytics recorded for session {id}"))
        }
        Ok(channels) => channels,
        Err(e) => return ApiErrorResponse::from_store_error(&e),
    };

    let recalculated = Orchestrator::recalculate_from_existing(
        &existing,
        options.mvc_amplitude_threshold,
        options.duration_threshold_ms,
    );

    if let Err(e) = state.store.channels.save_channel_analytics(&recalculated).await {
        return ApiErrorResponse::from_store_error(&e);
    }
    state.cache.invalidate(id);

    ApiResponse::ok(serde_json::json!({
        "session_id": id,
        "channels": recalculated,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SubjectiveUpdateRequest {
    pub rpe_post_session: Option<u8>,
    pub game_points_achieved: Option<u32>,
    pub game_points_max: Option<u32>,
}

/// `POST /sessions/{id}/subjective` — phase two of the two-phase
/// scoring flow: a therapist records RPE/game results after the fact,
/// and effort/game/overall are recomputed in place without re-running
/// the signal pipeline. Requires the session to already carry a first
/// scoring pass (phase one runs inline during `ProcessSession`).
pub async fn record_subjective_outcomes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SubjectiveUpdateRequest>,
) -> Response {
    let existing = match state.store.scores.load_by_session(id).await {
        Ok(Some(scores)) => scores,
        Ok(None) => return ApiErrorResponse::not_found(format!("no scores recorded for session {id}")),
        Err(e) => return ApiErrorResponse::from_store_error(&e),
    };

    let config = match state.store.scores.resolve_scoring_configuration(Some(existing.scoring_config_id), None).await
    {
        Ok(cfg) => cfg,
        Err(e) => return ApiErrorResponse::from_store_error(&e),
    };

    let updated = scoring::process_subjective_update(
        &existing,
        &config,
        request.rpe_post_session,
        request.game_points_achieved,
        request.game_points_max,
    );

    if let Err(e) = state.store.scores.save(&updated).await {
        return ApiErrorResponse::from_store_error(&e);
    }

    ApiResponse::ok(serde_json::json!({
        "session_id": id,
        "scores": updated,
    }))
}

/// `POST /mvc/calibrate` — freshly supplied C3D bytes in, per-channel
/// backend-estimated MVC thresholds out. Stateless: no session is
/// created or touched.
pub async fn calibrate(body: axum::body::Bytes) -> Response {
    let document = match c3d::parse(&body) {
        Ok(doc) => doc,
        Err(e) => return ApiErrorResponse::bad_request(format!("could not parse C3D file: {e}")),
    };
    let cfg = crate::config::get();

    let mut results = Vec::with_capacity(document.analog_channels.len());
    for channel in &document.analog_channels {
        let conditioned = match signal::condition(
            &channel.samples,
            document.sampling_rate_hz,
            cfg.filter_low_cutoff_hz,
            cfg.filter_high_cutoff_hz,
            cfg.filter_order,
            cfg.default_smoothing_window_ms,
            cfg.min_clinical_duration_seconds,
        ) {
            Ok(c) => c,
            Err(e) => return ApiErrorResponse::bad_request(format!("channel {}: {e}", channel.label)),
        };

        match mvc::estimate_mvc_from_signal(&conditioned.envelope) {
            Ok(estimate) => results.push(serde_json::json!({
                "channel": channel.label,
                "estimated_mvc": estimate,
            })),
            Err(e) => return ApiErrorResponse::bad_request(format!("channel {}: {e}", channel.label)),
        }
    }

    ApiResponse::ok(serde_json::json!({ "channels": results }))
}
