//! C7 — Session Orchestrator.
//!
//! The only component that writes to [`crate::store`]; every other
//! component (C1–C6) is a pure producer of data this module wires
//! together and persists. Uses a claim/process/complete worker-pool
//! shape over a Postgres job table, driving the full multi-stage EMG
//! pipeline.

pub mod code;
pub mod webhook;

use crate::analytics::{self, AnalyticsWindows};
use crate::c3d;
use crate::cache::AnalyticsCache;
use crate::contraction::{self, DetectionParams};
use crate::mvc::{self, MvcThresholdInputs};
use crate::scoring;
use crate::signal;
use crate::store::ArtifactStore;
use crate::types::{
    AnalyticsCacheEntry, BfrMonitoring, CacheSummary, ChannelAnalytics, ProcessingParameters, Session, SessionError,
    SessionMetrics, SessionSettings, SessionStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation failed: {message}")]
    Validation { message: String },
    #[error("signature verification failed: {message}")]
    Signature { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("file corrupted: {filename}: {technical_note}")]
    Corruption {
        filename: String,
        technical_note: String,
        recommendations: Vec<String>,
    },
    #[error("clinical duration too short: {actual_samples} < {min_samples_required}")]
    InsufficientDuration {
        min_samples_required: usize,
        actual_samples: usize,
    },
    #[error("processing failed: {message}")]
    ProcessingFailure { message: String },
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

impl OrchestratorError {
    fn into_session_error(self) -> SessionError {
        match self {
            OrchestratorError::Validation { message } => SessionError::Validation { message },
            OrchestratorError::Signature { message } => SessionError::Signature { message },
            OrchestratorError::NotFound { message } => SessionError::NotFound { message },
            OrchestratorError::Corruption {
                filename,
                technical_note,
                recommendations,
            } => SessionError::Corruption {
                filename,
                technical_note,
                recommendations,
            },
            OrchestratorError::InsufficientDuration {
                min_samples_required,
                actual_samples,
            } => SessionError::InsufficientDuration {
                min_samples_required,
                actual_samples,
                reason: "recording shorter than the minimum clinical duration".to_string(),
            },
            OrchestratorError::ProcessingFailure { message } => SessionError::ProcessingFailure { message },
            OrchestratorError::Store(e) => SessionError::ProcessingFailure { message: e.to_string() },
        }
    }
}

/// Abstracts "download the bytes behind this file reference" so the
/// orchestrator is testable without real object storage. Production
/// wiring uses an HTTP-backed implementation in `src/api`.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn fetch(&self, file_ref: &str) -> Result<Vec<u8>, OrchestratorError>;
}

pub struct CreateSessionRequest<'a> {
    pub file_ref: &'a str,
    pub patient_id: Option<&'a str>,
    pub therapist_id: Option<&'a str>,
}

pub struct Orchestrator {
    store: ArtifactStore,
    cache: Arc<AnalyticsCache>,
    file_source: Arc<dyn FileSource>,
}

impl Orchestrator {
    pub fn new(store: ArtifactStore, cache: Arc<AnalyticsCache>, file_source: Arc<dyn FileSource>) -> Self {
        Self {
            store,
            cache,
            file_source,
        }
    }

    /// `CreateSession`: idempotent by content hash of the source file's
    /// bytes — downloaded here once just to compute the hash, and again
    /// in `run_pipeline` when the session is actually processed.
    pub async fn create_session(&self, request: CreateSessionRequest<'_>) -> Result<Uuid, OrchestratorError> {
        let bytes = self.file_source.fetch(request.file_ref).await?;
        let content_hash = hash_bytes(&bytes);

        if let Some(existing) = self.store.sessions.find_by_hash(&content_hash).await? {
            info!(session_id = %existing.id, "create_session: hash collision, returning existing session");
            return Ok(existing.id);
        }

        let patient_ordinal = request
            .patient_id
            .and_then(|p| p.trim_start_matches('P').parse::<u32>().ok())
            .unwrap_or(1);
        let session_ordinal = self
            .store
            .sessions
            .next_session_ordinal(request.patient_id.unwrap_or("unknown"))
            .await?;
        let session_code = code::format_session_code(patient_ordinal, session_ordinal);

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            content_hash: content_hash.clone(),
            file_ref: request.file_ref.to_string(),
            session_code,
            patient_id: request.patient_id.map(str::to_string),
            therapist_id: request.therapist_id.map(str::to_string),
            status: SessionStatus::Pending,
            scoring_config_id: None,
            game_metadata: serde_json::Value::Null,
            session_date: None,
            processing_error: None,
            created_at: now,
            updated_at: now,
        };

        // Two concurrent uploads of the same bytes can both pass the
        // find_by_hash check above before either inserts. The loser's
        // INSERT hits the unique index on content_hash; re-read and
        // hand back the winner's id instead of surfacing the conflict.
        match self.store.sessions.insert_pending(&session).await {
            Ok(()) => {
                info!(session_id = %session.id, code = %session.session_code, "session created");
                Ok(session.id)
            }
            Err(crate::store::StoreError::Database(e)) if crate::store::is_unique_violation(&e) => {
                let existing = self.store.sessions.find_by_hash(&content_hash).await?.ok_or_else(|| {
                    OrchestratorError::ProcessingFailure {
                        message: "unique violation on content_hash but no row found on re-read".to_string(),
                    }
                })?;
                info!(session_id = %existing.id, "create_session: lost insert race, returning existing session");
                Ok(existing.id)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `ProcessSession`: pending → processing → {completed | failed}.
    pub async fn process_session(&self, session_id: Uuid) -> Result<(), OrchestratorError> {
        let session = self.store.sessions.get(session_id).await?;
        self.store
            .sessions
            .update_status(session_id, SessionStatus::Processing, None)
            .await?;
        info!(%session_id, "session processing started");

        match self.run_pipeline(&session).await {
            Ok(()) => {
                self.store
                    .sessions
                    .update_status(session_id, SessionStatus::Completed, None)
                    .await?;
                info!(%session_id, "session processing completed");
                Ok(())
            }
            Err(err) => {
                let session_error = err.into_session_error();
                error!(%session_id, error = ?session_error, "session processing failed");
                self.store
                    .sessions
                    .update_status(session_id, SessionStatus::Failed, Some(&session_error))
                    .await?;
                Err(OrchestratorError::ProcessingFailure {
                    message: "session transitioned to failed; see processing_error".to_string(),
                })
            }
        }
    }

    async fn run_pipeline(&self, session: &Session) -> Result<(), OrchestratorError> {
        let cfg = crate::config::get();
        let bytes = self.file_source.fetch(&session.file_ref).await?;

        let document = c3d::parse(&bytes).map_err(|e| OrchestratorError::Corruption {
            filename: session.session_code.clone(),
            technical_note: e.to_string(),
            recommendations: vec!["verify the file is an uncorrupted C3D export".to_string()],
        })?;
        let metadata = c3d::extract_metadata(&document);

        let mut metrics = SessionMetrics {
            expected_contractions_per_muscle: cfg.expected_contractions_per_muscle,
            ..SessionMetrics::default()
        };

        let mut channel_rows = Vec::with_capacity(document.analog_channels.len());
        let mut bfr_rows = Vec::new();

        // Condition every channel up front, keyed by its position, so a
        // Raw channel's detection pass can reach across to its
        // activated sibling's envelope regardless of which comes first
        // in the C3D's analog channel order.
        let mut conditioned: Vec<signal::ConditionedSignal> = Vec::with_capacity(document.analog_channels.len());
        for channel in &document.analog_channels {
            let signal = signal::condition(
                &channel.samples,
                document.sampling_rate_hz,
                cfg.filter_low_cutoff_hz,
                cfg.filter_high_cutoff_hz,
                cfg.filter_order,
                cfg.default_smoothing_window_ms,
                cfg.min_clinical_duration_seconds,
            )
            .map_err(|e| match e {
                signal::ConditioningError::InsufficientDuration {
                    actual_samples,
                    min_samples_required,
                } => OrchestratorError::InsufficientDuration {
                    min_samples_required,
                    actual_samples,
                },
                other => OrchestratorError::ProcessingFailure {
                    message: other.to_string(),
                },
            })?;
            conditioned.push(signal);
        }

        // Group channels by base muscle name: a Raw/activated pair
        // collapses onto one muscle, with the activated sibling's
        // envelope used only to time contraction edges. raw_index is
        // the amplitude source; falls back to the activated channel
        // itself if no Raw sibling was recorded.
        struct ChannelGroup<'a> {
            base_name: &'a str,
            raw_index: usize,
            activated_index: Option<usize>,
        }
        let mut groups: Vec<ChannelGroup> = Vec::new();
        for (index, channel) in document.analog_channels.iter().enumerate() {
            let base = base_muscle_name(&channel.label);
            let activated = is_activated_channel(&channel.label);
            match groups.iter_mut().find(|g| g.base_name == base) {
                Some(entry) if activated => entry.activated_index = Some(index),
                // A raw sibling arriving after an activated-only placeholder
                // (raw_index standing in for the missing raw channel) takes
                // over as the true amplitude source.
                Some(entry) if entry.activated_index == Some(entry.raw_index) => entry.raw_index = index,
                Some(_) => {}
                None => groups.push(ChannelGroup {
                    base_name: base,
                    raw_index: index,
                    activated_index: if activated { Some(index) } else { None },
                }),
            }
        }

        for (group_index, group) in groups.iter().enumerate() {
            let base_name = group.base_name;
            let primary_index = group.raw_index;
            let primary = &conditioned[primary_index];
            let timing_signal = group
                .activated_index
                .filter(|&i| i != primary_index)
                .map(|i| conditioned[i].envelope.as_slice());

            let mvc_resolution = mvc::resolve_mvc_threshold(
                &MvcThresholdInputs {
                    per_muscle_mvc: None,
                    global_mvc: None,
                    mvc_threshold_percentage: cfg.default_mvc_threshold_percentage / 100.0,
                },
                &primary.envelope,
            )
            .map_err(|e| OrchestratorError::ProcessingFailure { message: e.to_string() })?;

            let detection = contraction::analyze_contractions(
                &primary.envelope,
                timing_signal,
                document.sampling_rate_hz,
                &DetectionParams {
                    threshold_factor: cfg.default_threshold_factor,
                    activated_threshold_factor: cfg.activated_threshold_factor,
                    min_duration_ms: cfg.default_min_duration_ms,
                    merge_threshold_ms: cfg.merge_threshold_ms,
                    refractory_period_ms: cfg.refractory_period_ms,
                    mvc_amplitude_threshold: Some(mvc_resolution.threshold_value),
                    duration_threshold_ms: Some(cfg.default_duration_threshold_ms),
                },
            )
            .map_err(|e| OrchestratorError::ProcessingFailure { message: e.to_string() })?;

            let raw_f64: Vec<f64> = document.analog_channels[primary_index]
                .samples
                .iter()
                .map(|&v| f64::from(v))
                .collect();
            let windows = AnalyticsWindows {
                rms_window_samples: (document.sampling_rate_hz as usize).max(1),
                mav_window_samples: (document.sampling_rate_hz as usize).max(1),
                spectral_window_samples: 256,
            };

            let channel_analytics = analytics::compute_channel_analytics(
                session.id,
                base_name,
                &primary.envelope,
                &raw_f64,
                &primary.report,
                &detection,
                document.sampling_rate_hz,
                windows,
                Some(mvc_resolution.threshold_value),
                mvc_resolution.method,
                Some(cfg.default_duration_threshold_ms),
            )
            .map_err(|e| OrchestratorError::ProcessingFailure { message: e.to_string() })?;

            accumulate_metrics(&mut metrics, group_index, &channel_analytics);
            channel_rows.push(channel_analytics);

            bfr_rows.push(BfrMonitoring {
                session_id: session.id,
                channel: base_name.to_string(),
                target_pressure_aop: None,
                actual_pressure_aop: None,
                cuff_pressure_mmhg: None,
                systolic_bp: None,
                diastolic_bp: None,
                manual_compliance: None,
                safety_compliant: None,
                measurement_method: crate::types::BfrMeasurementMethod::Sensor,
                measured_at: None,
            });
        }

        let scoring_config = self
            .store
            .scores
            .resolve_scoring_configuration(session.scoring_config_id, session.patient_id.as_deref())
            .await?;

        let scores = scoring::process_after_emg_analysis(session.id, &metrics, &scoring_config, cfg.bfr_gate_range)
            .map_err(|e| OrchestratorError::ProcessingFailure { message: e.to_string() })?;

        let processing_params = ProcessingParameters {
            session_id: session.id,
            sampling_rate_hz: document.sampling_rate_hz,
            filter_low_cutoff_hz: cfg.filter_low_cutoff_hz,
            filter_high_cutoff_hz: cfg.filter_high_cutoff_hz,
            filter_order: cfg.filter_order,
            rms_window_samples: (document.sampling_rate_hz as usize).max(1),
            rms_overlap_samples: 0,
            mvc_window_samples: (document.sampling_rate_hz as usize).max(1),
            mvc_threshold_percentage: cfg.default_mvc_threshold_percentage,
            pipeline_version: cfg.processing_version.clone(),
        };
        let session_settings = SessionSettings {
            session_id: session.id,
            mvc_threshold_percentage: Some(cfg.default_mvc_threshold_percentage),
            duration_threshold_ms: Some(cfg.default_duration_threshold_ms),
            expected_contractions_per_muscle: cfg.expected_contractions_per_muscle,
            bfr_enabled: false,
        };

        self.store.channels.save_processing_parameters(&processing_params).await?;
        self.store.channels.save_session_settings(&session_settings).await?;
        self.store.channels.save_channel_analytics(&channel_rows).await?;
        self.store.channels.upsert_bfr_monitoring(&bfr_rows).await?;
        self.store.scores.save(&scores).await?;
        self.store
            .sessions
            .set_scoring_config_id(session.id, scoring_config.id)
            .await?;

        let game_metadata = serde_json::json!({
            "game_name": metadata.game_name,
            "level": metadata.level,
            "duration": metadata.duration,
            "therapist_id": metadata.therapist_id,
            "group_id": metadata.group_id,
            "player_name": metadata.player_name,
            "game_score": metadata.game_score,
        });
        self.store
            .sessions
            .set_game_metadata_and_date(session.id, game_metadata.clone(), metadata.time)
            .await?;

        let overall_compliance = scores.compliance.map(|s| s.get());
        let cache_entry = AnalyticsCacheEntry {
            session_id: session.id,
            analytics: serde_json::to_value(&channel_rows).unwrap_or(serde_json::Value::Null),
            summary: CacheSummary {
                channels: document.channel_labels.clone(),
                total_channels: document.channel_count,
                overall_compliance,
                processed_at: Utc::now(),
            },
            c3d_metadata: game_metadata,
            cache_version: 1,
            cached_at: Utc::now(),
        };

        // Cache failure is best-effort and must never fail the session —
        // there is no fallible path here, but if a future cache backend
        // introduces one, it must be caught, not `?`-ed.
        self.cache.set(session.id, cache_entry);

        Ok(())
    }

    /// `RecalculateFromExisting`: recompute compliance/counters from
    /// already-stored per-contraction measurements under new
    /// thresholds, without re-parsing the source file.
    pub fn recalculate_from_existing(
        existing: &[ChannelAnalytics],
        mvc_amplitude_threshold: Option<f64>,
        duration_threshold_ms: Option<f64>,
    ) -> Vec<ChannelAnalytics> {
        existing
            .iter()
            .map(|channel| {
                let mut updated = channel.clone();
                let mut mvc_compliant = 0usize;
                let mut duration_compliant = 0usize;
                let mut good = 0usize;

                for contraction in &mut updated.contractions {
                    contraction.meets_mvc = mvc_amplitude_threshold.is_some_and(|t| contraction.max_amplitude >= t);
                    contraction.meets_duration =
                        duration_threshold_ms.is_some_and(|t| contraction.duration_ms >= t);
                    contraction.is_good = match (mvc_amplitude_threshold, duration_threshold_ms) {
                        (Some(_), Some(_)) => contraction.meets_mvc && contraction.meets_duration,
                        (Some(_), None) => contraction.meets_mvc,
                        (None, Some(_)) => contraction.meets_duration,
                        (None, None) => false,
                    };
                    if contraction.meets_mvc {
                        mvc_compliant += 1;
                    }
                    if contraction.meets_duration {
                        duration_compliant += 1;
                    }
                    if contraction.is_good {
                        good += 1;
                    }
                }

                updated.mvc_compliant_count = mvc_compliant;
                updated.duration_compliant_count = duration_compliant;
                updated.good_count = good;
                updated.mvc_threshold_actual_value = mvc_amplitude_threshold;
                updated.duration_threshold_actual_value = duration_threshold_ms;
                updated
            })
            .collect()
    }
}

/// Muscles alternate left/right by position (first muscle group=left,
/// second=right, ...) — the two-channel clinical setup this crate
/// targets never labels sidedness any other way. `group_index` counts
/// muscle groups after Raw/activated siblings have already collapsed
/// onto one entry each, not raw analog channels.
fn accumulate_metrics(metrics: &mut SessionMetrics, group_index: usize, analytics: &ChannelAnalytics) {
    let is_right = group_index % 2 == 1;
    if is_right {
        metrics.right_total += analytics.contraction_count as u32;
        metrics.right_good += analytics.good_count as u32;
        metrics.right_mvc_compliant += analytics.mvc_compliant_count as u32;
        metrics.right_duration_compliant += analytics.duration_compliant_count as u32;
    } else {
        metrics.left_total += analytics.contraction_count as u32;
        metrics.left_good += analytics.good_count as u32;
        metrics.left_mvc_compliant += analytics.mvc_compliant_count as u32;
        metrics.left_duration_compliant += analytics.duration_compliant_count as u32;
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Strip the Raw/activated suffix EMG channel labels carry so siblings
/// recorded for the same muscle (e.g. "Biceps Raw" and "Biceps
/// activated") collapse onto one base name.
fn base_muscle_name(label: &str) -> &str {
    label
        .strip_suffix(" Raw")
        .or_else(|| label.strip_suffix(" activated"))
        .unwrap_or(label)
}

fn is_activated_channel(label: &str) -> bool {
    label.ends_with(" activated")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MvcEstimationMethod, PerChannelContraction, TemporalStat};
    use std::collections::HashMap;

    fn channel(meets_mvc: bool, meets_duration: bool) -> ChannelAnalytics {
        ChannelAnalytics {
            session_id: Uuid::nil(),
            channel_name: "CH1".to_string(),
            contraction_count: 1,
            mvc_compliant_count: 0,
            duration_compliant_count: 0,
            good_count: 0,
            avg_amplitude: 1.0,
            max_amplitude: 1.0,
            avg_duration_ms: 200.0,
            min_duration_ms: 200.0,
            max_duration_ms: 200.0,
            total_time_under_tension_ms: 200.0,
            contractions: vec![PerChannelContraction {
                start_ms: 0.0,
                end_ms: 200.0,
                duration_ms: 200.0,
                mean_amplitude: 1.0,
                max_amplitude: 1.0,
                meets_mvc,
                meets_duration,
                is_good: false,
            }],
            rms_temporal_stats: TemporalStat::default(),
            mav_temporal_stats: TemporalStat::default(),
            mpf_temporal_stats: TemporalStat::default(),
            mdf_temporal_stats: TemporalStat::default(),
            fatigue_index_temporal_stats: TemporalStat::default(),
            mvc_threshold_actual_value: None,
            mvc_estimation_method: MvcEstimationMethod::None,
            duration_threshold_actual_value: None,
            signal_quality_score: 100.0,
            errors: HashMap::new(),
        }
    }

    #[test]
    fn recalculate_reclassifies_without_touching_other_fields() {
        let existing = vec![channel(false, false)];
        let recalculated = Orchestrator::recalculate_from_existing(&existing, Some(0.5), Some(100.0));
        assert!(recalculated[0].contractions[0].meets_mvc);
        assert!(recalculated[0].contractions[0].meets_duration);
        assert!(recalculated[0].contractions[0].is_good);
        assert_eq!(recalculated[0].good_count, 1);
    }

    #[test]
    fn hash_is_stable_for_same_bytes() {
        assert_eq!(hash_bytes(b"file contents"), hash_bytes(b"file contents"));
        assert_ne!(hash_bytes(b"file contents"), hash_bytes(b"other contents"));
    }

    #[test]
    fn base_muscle_name_strips_sibling_suffixes() {
        assert_eq!(base_muscle_name("Biceps Raw"), "Biceps");
        assert_eq!(base_muscle_name("Biceps activated"), "Biceps");
        assert_eq!(base_muscle_name("Quadriceps"), "Quadriceps");
    }

    #[test]
    fn is_activated_channel_detects_suffix() {
        assert!(is_activated_channel("Biceps activated"));
        assert!(!is_activated_channel("Biceps Raw"));
        assert!(!is_activated_channel("Biceps"));
    }
}
