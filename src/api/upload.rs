//! Synchronous upload: submit raw C3D bytes, get analytics back inline.
//! No session is created and nothing is persisted — this is the
//! stateless twin of the webhook-triggered pipeline in
//! [`crate::session::Orchestrator::process_session`].

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::analytics::{self, AnalyticsWindows};
use crate::contraction::{self, DetectionParams};
use crate::mvc::{self, MvcThresholdInputs};
use crate::signal;
use crate::{c3d, config};
use axum::extract::Query;
use axum::response::Response;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UploadOptions {
    pub threshold_factor: Option<f64>,
    pub min_duration_ms: Option<f64>,
    pub smoothing_window_ms: Option<f64>,
    pub mvc_threshold_percentage: Option<f64>,
    pub duration_threshold_ms: Option<f64>,
    pub expected_contractions_per_muscle: Option<u32>,
}

/// `POST /analyze` — the body is the raw C3D file, nothing else.
pub async fn analyze(Query(options): Query<UploadOptions>, body: axum::body::Bytes) -> Response {
    let cfg = config::get();

    if body.len() as u64 > cfg.max_file_size_bytes {
        return ApiErrorResponse::payload_too_large(format!(
            "file is {} bytes, limit is {}",
            body.len(),
            cfg.max_file_size_bytes
        ));
    }

    let document = match c3d::parse(&body) {
        Ok(doc) => doc,
        Err(e) => return ApiErrorResponse::bad_request(format!("could not parse C3D file: {e}")),
    };

    let synthetic_session_id = Uuid::nil();
    let mut channels = Vec::with_capacity(document.analog_channels.len());

    for channel in &document.analog_channels {
        match analyze_one_channel(synthetic_session_id, channel, document.sampling_rate_hz, &options, cfg) {
            Ok(row) => channels.push(row),
            Err(e) => return ApiErrorResponse::bad_request(e),
        }
    }

    let metadata = c3d::extract_metadata(&document);
    ApiResponse::ok(serde_json::json!({
        "sampling_rate_hz": document.sampling_rate_hz,
        "channel_count": document.channel_count,
        "c3d_metadata": {
            "game_name": metadata.game_name,
            "level": metadata.level,
            "duration": metadata.duration,
            "player_name": metadata.player_name,
        },
        "channels": channels,
    }))
}

fn analyze_one_channel(
    session_id: Uuid,
    channel: &c3d::AnalogChannel,
    sampling_rate_hz: f64,
    options: &UploadOptions,
    cfg: &config::EmgConfig,
) -> Result<crate::types::ChannelAnalytics, String> {
    let conditioned = signal::condition(
        &channel.samples,
        sampling_rate_hz,
        cfg.filter_low_cutoff_hz,
        cfg.filter_high_cutoff_hz,
        cfg.filter_order,
        options.smoothing_window_ms.unwrap_or(cfg.default_smoothing_window_ms),
        cfg.min_clinical_duration_seconds,
    )
    .map_err(|e| format!("channel {}: {e}", channel.label))?;

    let mvc_percentage = options.mvc_threshold_percentage.unwrap_or(cfg.default_mvc_threshold_percentage) / 100.0;
    let mvc_resolution = mvc::resolve_mvc_threshold(
        &MvcThresholdInputs {
            per_muscle_mvc: None,
            global_mvc: None,
            mvc_threshold_percentage: mvc_percentage,
        },
        &conditioned.envelope,
    )
    .map_err(|e| format!("channel {}: {e}", channel.label))?;

    let duration_threshold_ms = options.duration_threshold_ms.unwrap_or(cfg.default_duration_threshold_ms);

    let detection = contraction::analyze_contractions(
        &conditioned.envelope,
        None,
        sampling_rate_hz,
        &DetectionParams {
            threshold_factor: options.threshold_factor.unwrap_or(cfg.default_threshold_factor),
            activated_threshold_factor: cfg.activated_threshold_factor,
            min_duration_ms: options.min_duration_ms.unwrap_or(cfg.default_min_duration_ms),
            merge_threshold_ms: cfg.merge_threshold_ms,
            refractory_period_ms: cfg.refractory_period_ms,
            mvc_amplitude_threshold: Some(mvc_resolution.threshold_value),
            duration_threshold_ms: Some(duration_threshold_ms),
        },
    )
    .map_err(|e| format!("channel {}: {e}", channel.label))?;

    let raw_f64: Vec<f64> = channel.samples.iter().map(|&v| f64::from(v)).collect();
    let windows = AnalyticsWindows {
        rms_window_samples: (sampling_rate_hz as usize).max(1),
        mav_window_samples: (sampling_rate_hz as usize).max(1),
        spectral_window_samples: 256,
    };

    analytics::compute_channel_analytics(
        session_id,
        &channel.label,
        &conditioned.envelope,
        &raw_f64,
        &conditioned.report,
        &detection,
        sampling_rate_hz,
        windows,
        Some(mvc_resolution.threshold_value),
        mvc_resolution.method,
        Some(duration_threshold_ms),
    )
    .map_err(|e| format!("channel {}: {e}", channel.label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_options_defaults_to_none_everywhere() {
        let options: UploadOptions = serde_urlencoded::from_str("").unwrap();
        assert!(options.threshold_factor.is_none());
        assert!(options.mvc_threshold_percentage.is_none());
    }

    #[test]
    fn upload_options_parses_query_string() {
        let options: UploadOptions =
            serde_urlencoded::from_str("threshold_factor=0.2&min_duration_ms=150").unwrap();
        assert_eq!(options.threshold_factor, Some(0.2));
        assert_eq!(options.min_duration_ms, Some(150.0));
    }
}
