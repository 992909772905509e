//! Per-channel artifact persistence: `ChannelAnalytics` (bulk insert),
//! `ProcessingParameters`, `SessionSettings`, and `BFRMonitoring`
//! (composite-key upsert per channel).

use super::StoreError;
use crate::types::{
    BfrMonitoring, ChannelAnalytics, MvcEstimationMethod, PerChannelContraction, ProcessingParameters,
    SessionSettings, TemporalStat,
};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct ChannelsRepository {
    pool: PgPool,
}

impl ChannelsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Bulk-insert one `ChannelAnalytics` row per channel. Each row is
    /// stored with its structured sub-documents as JSONB rather than
    /// flattened columns — the scoring/analytics shapes evolve faster
    /// than a rigid schema should.
    pub async fn save_channel_analytics(&self, rows: &[ChannelAnalytics]) -> Result<(), StoreError> {
        for row in rows {
            sqlx::query(
                "INSERT INTO channel_analytics \
                    (session_id, channel_name, contraction_count, mvc_compliant_count, \
                     duration_compliant_count, good_count, avg_amplitude, max_amplitude, \
                     avg_duration_ms, min_duration_ms, max_duration_ms, total_time_under_tension_ms, \
                     signal_quality_score, mvc_threshold_actual_value, duration_threshold_actual_value, \
                     mvc_estimation_method, contractions, temporal_stats, errors) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19) \
                 ON CONFLICT (session_id, channel_name) DO UPDATE SET \
                    contraction_count = EXCLUDED.contraction_count, \
                    mvc_compliant_count = EXCLUDED.mvc_compliant_count, \
                    duration_compliant_count = EXCLUDED.duration_compliant_count, \
                    good_count = EXCLUDED.good_count, \
                    avg_amplitude = EXCLUDED.avg_amplitude, \
                    max_amplitude = EXCLUDED.max_amplitude, \
                    avg_duration_ms = EXCLUDED.avg_duration_ms, \
                    min_duration_ms = EXCLUDED.min_duration_ms, \
                    max_duration_ms = EXCLUDED.max_duration_ms, \
                    total_time_under_tension_ms = EXCLUDED.total_time_under_tension_ms, \
                    signal_quality_score = EXCLUDED.signal_quality_score, \
                    mvc_threshold_actual_value = EXCLUDED.mvc_threshold_actual_value, \
                    duration_threshold_actual_value = EXCLUDED.duration_threshold_actual_value, \
                    mvc_estimation_method = EXCLUDED.mvc_estimation_method, \
                    contractions = EXCLUDED.contractions, \
                    temporal_stats = EXCLUDED.temporal_stats, \
                    errors = EXCLUDED.errors",
            )
            .bind(row.session_id)
            .bind(&row.channel_name)
            .bind(row.contraction_count as i32)
            .bind(row.mvc_compliant_count as i32)
            .bind(row.duration_compliant_count as i32)
            .bind(row.good_count as i32)
            .bind(row.avg_amplitude)
            .bind(row.max_amplitude)
            .bind(row.avg_duration_ms)
            .bind(row.min_duration_ms)
            .bind(row.max_duration_ms)
            .bind(row.total_time_under_tension_ms)
            .bind(row.signal_quality_score)
            .bind(row.mvc_threshold_actual_value)
            .bind(row.duration_threshold_actual_value)
            .bind(format!("{:?}", row.mvc_estimation_method))
            .bind(serde_json::to_value(&row.contractions).unwrap_or(serde_json::Value::Null))
            .bind(serde_json::json!({
                "rms": row.rms_temporal_stats,
                "mav": row.mav_temporal_stats,
                "mpf": row.mpf_temporal_stats,
                "mdf": row.mdf_temporal_stats,
                "fatigue_index": row.fatigue_index_temporal_stats,
            }))
            .bind(serde_json::to_value(&row.errors).unwrap_or(serde_json::Value::Null))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Store-fallback path for `GetSessionAnalytics` when the cache has
    /// expired or never held this session, and the read path for
    /// `RecalcAnalytics`.
    pub async fn load_by_session(&self, session_id: Uuid) -> Result<Vec<ChannelAnalytics>, StoreError> {
        let rows: Vec<ChannelAnalyticsRow> = sqlx::query_as(
            "SELECT session_id, channel_name, contraction_count, mvc_compliant_count, \
                    duration_compliant_count, good_count, avg_amplitude, max_amplitude, \
                    avg_duration_ms, min_duration_ms, max_duration_ms, total_time_under_tension_ms, \
                    signal_quality_score, mvc_threshold_actual_value, duration_threshold_actual_value, \
                    mvc_estimation_method, contractions, temporal_stats, errors \
             FROM channel_analytics WHERE session_id = $1 ORDER BY channel_name",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChannelAnalyticsRow::into_domain).collect())
    }

    pub async fn save_processing_parameters(&self, params: &ProcessingParameters) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO processing_parameters \
                (session_id, sampling_rate_hz, filter_low_cutoff_hz, filter_high_cutoff_hz, \
                 filter_order, rms_window_samples, rms_overlap_samples, mvc_window_samples, \
                 mvc_threshold_percentage, pipeline_version) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10) \
             ON CONFLICT (session_id) DO UPDATE SET \
                sampling_rate_hz = EXCLUDED.sampling_rate_hz, \
                filter_low_cutoff_hz = EXCLUDED.filter_low_cutoff_hz, \
                filter_high_cutoff_hz = EXCLUDED.filter_high_cutoff_hz, \
                filter_order = EXCLUDED.filter_order, \
                rms_window_samples = EXCLUDED.rms_window_samples, \
                rms_overlap_samples = EXCLUDED.rms_overlap_samples, \
                mvc_window_samples = EXCLUDED.mvc_window_samples, \
                mvc_threshold_percentage = EXCLUDED.mvc_threshold_percentage, \
                pipeline_version = EXCLUDED.pipeline_version",
        )
        .bind(params.session_id)
        .bind(params.sampling_rate_hz)
        .bind(params.filter_low_cutoff_hz)
        .bind(params.filter_high_cutoff_hz)
        .bind(params.filter_order as i32)
        .bind(params.rms_window_samples as i32)
        .bind(params.rms_overlap_samples as i32)
        .bind(params.mvc_window_samples as i32)
        .bind(params.mvc_threshold_percentage)
        .bind(&params.pipeline_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_session_settings(&self, settings: &SessionSettings) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO session_settings \
                (session_id, mvc_threshold_percentage, duration_threshold_ms, \
                 expected_contractions_per_muscle, bfr_enabled) \
             VALUES ($1,$2,$3,$4,$5) \
             ON CONFLICT (session_id) DO UPDATE SET \
                mvc_threshold_percentage = EXCLUDED.mvc_threshold_percentage, \
                duration_threshold_ms = EXCLUDED.duration_threshold_ms, \
                expected_contractions_per_muscle = EXCLUDED.expected_contractions_per_muscle, \
                bfr_enabled = EXCLUDED.bfr_enabled",
        )
        .bind(settings.session_id)
        .bind(settings.mvc_threshold_percentage)
        .bind(settings.duration_threshold_ms)
        .bind(settings.expected_contractions_per_muscle as i32)
        .bind(settings.bfr_enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Composite-key (session, channel) upsert — BFR is recorded per
    /// channel, same as `ChannelAnalytics`.
    pub async fn upsert_bfr_monitoring(&self, rows: &[BfrMonitoring]) -> Result<(), StoreError> {
        for row in rows {
            sqlx::query(
                "INSERT INTO bfr_monitoring \
                    (session_id, channel, target_pressure_aop, actual_pressure_aop, \
                     cuff_pressure_mmhg, systolic_bp, diastolic_bp, manual_compliance, \
                     safety_compliant, measurement_method, measured_at) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11) \
                 ON CONFLICT (session_id, channel) DO UPDATE SET \
                    target_pressure_aop = EXCLUDED.target_pressure_aop, \
                    actual_pressure_aop = EXCLUDED.actual_pressure_aop, \
                    cuff_pressure_mmhg = EXCLUDED.cuff_pressure_mmhg, \
                    systolic_bp = EXCLUDED.systolic_bp, \
                    diastolic_bp = EXCLUDED.diastolic_bp, \
                    manual_compliance = EXCLUDED.manual_compliance, \
                    safety_compliant = EXCLUDED.safety_compliant, \
                    measurement_method = EXCLUDED.measurement_method, \
                    measured_at = EXCLUDED.measured_at",
            )
            .bind(row.session_id)
            .bind(&row.channel)
            .bind(row.target_pressure_aop)
            .bind(row.actual_pressure_aop)
            .bind(row.cuff_pressure_mmhg)
            .bind(row.systolic_bp)
            .bind(row.diastolic_bp)
            .bind(row.manual_compliance)
            .bind(row.safety_compliant)
            .bind(format!("{:?}", row.measurement_method))
            .bind(row.measured_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ChannelAnalyticsRow {
    session_id: Uuid,
    channel_name: String,
    contraction_count: i32,
    mvc_compliant_count: i32,
    duration_compliant_count: i32,
    good_count: i32,
    avg_amplitude: f64,
    max_amplitude: f64,
    avg_duration_ms: f64,
    min_duration_ms: f64,
    max_duration_ms: f64,
    total_time_under_tension_ms: f64,
    signal_quality_score: f64,
    mvc_threshold_actual_value: Option<f64>,
    duration_threshold_actual_value: Option<f64>,
    mvc_estimation_method: String,
    contractions: serde_json::Value,
    temporal_stats: serde_json::Value,
    errors: serde_json::Value,
}

impl ChannelAnalyticsRow {
    fn into_domain(self) -> ChannelAnalytics {
        let temporal: serde_json::Map<String, serde_json::Value> = self
            .temporal_stats
            .as_object()
            .cloned()
            .unwrap_or_default();
        let stat = |key: &str| {
            temporal
                .get(key)
                .and_then(|v| serde_json::from_value::<TemporalStat>(v.clone()).ok())
                .unwrap_or_default()
        };

        ChannelAnalytics {
            session_id: self.session_id,
            channel_name: self.channel_name,
            contraction_count: self.contraction_count as usize,
            mvc_compliant_count: self.mvc_compliant_count as usize,
            duration_compliant_count: self.duration_compliant_count as usize,
            good_count: self.good_count as usize,
            avg_amplitude: self.avg_amplitude,
            max_amplitude: self.max_amplitude,
            avg_duration_ms: self.avg_duration_ms,
            min_duration_ms: self.min_duration_ms,
            max_duration_ms: self.max_duration_ms,
            total_time_under_tension_ms: self.total_time_under_tension_ms,
            contractions: serde_json::from_value::<Vec<PerChannelContraction>>(self.contractions)
                .unwrap_or_default(),
            rms_temporal_stats: stat("rms"),
            mav_temporal_stats: stat("mav"),
            mpf_temporal_stats: stat("mpf"),
            mdf_temporal_stats: stat("mdf"),
            fatigue_index_temporal_stats: stat("fatigue_index"),
            mvc_threshold_actual_value: self.mvc_threshold_actual_value,
            mvc_estimation_method: match self.mvc_estimation_method.as_str() {
                "UserProvided" => MvcEstimationMethod::UserProvided,
                "GlobalProvided" => MvcEstimationMethod::GlobalProvided,
                "BackendEstimation" => MvcEstimationMethod::BackendEstimation,
                _ => MvcEstimationMethod::None,
            },
            duration_threshold_actual_value: self.duration_threshold_actual_value,
            signal_quality_score: self.signal_quality_score,
            errors: serde_json::from_value(self.errors).unwrap_or_default(),
        }
    }
}
