//! Core data model shared by every component.
//!
//! Types here carry no behavior beyond constructors that enforce the
//! invariants the rest of the crate relies on — clamped rates, bounded
//! scores, and the session/channel composite keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A rate normalized to `[0.0, 1.0]`. The only way to construct one is
/// through [`Rate01::new`], which clamps — this is the single canonical
/// clamp point referenced in DESIGN.md's Open Question resolution.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Rate01(f64);

impl Rate01 {
    pub fn new(raw: f64) -> Self {
        Self(raw.clamp(0.0, 1.0))
    }

    pub fn get(self) -> f64 {
        self.0
    }

    /// True when the raw ratio exceeded 1.0 before clamping — callers
    /// use this to emit the "exceeded target but capped" audit line.
    pub fn was_capped(raw: f64) -> bool {
        raw > 1.0
    }

    pub const ZERO: Rate01 = Rate01(0.0);
}

/// A score normalized to `[0.0, 100.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Score0100(f64);

impl Score0100 {
    pub fn new(raw: f64) -> Self {
        Self(raw.clamp(0.0, 100.0))
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Monotonic transition check: statuses only ever move forward.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Pending, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// Structured error recorded on a failed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SessionError {
    Validation { message: String },
    Signature { message: String },
    NotFound { message: String },
    Corruption {
        filename: String,
        technical_note: String,
        recommendations: Vec<String>,
    },
    InsufficientDuration {
        min_samples_required: usize,
        actual_samples: usize,
        reason: String,
    },
    ProcessingFailure { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub content_hash: String,
    pub file_ref: String,
    pub session_code: String,
    pub patient_id: Option<String>,
    pub therapist_id: Option<String>,
    pub status: SessionStatus,
    pub scoring_config_id: Option<Uuid>,
    pub game_metadata: serde_json::Value,
    pub session_date: Option<DateTime<Utc>>,
    pub processing_error: Option<SessionError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-(session, channel) temporal statistic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct TemporalStat {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub valid_windows: usize,
    pub coefficient_of_variation: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerChannelContraction {
    pub start_ms: f64,
    pub end_ms: f64,
    pub duration_ms: f64,
    pub mean_amplitude: f64,
    pub max_amplitude: f64,
    pub meets_mvc: bool,
    pub meets_duration: bool,
    pub is_good: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAnalytics {
    pub session_id: Uuid,
    pub channel_name: String,
    pub contraction_count: usize,
    pub mvc_compliant_count: usize,
    pub duration_compliant_count: usize,
    pub good_count: usize,
    pub avg_amplitude: f64,
    pub max_amplitude: f64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub total_time_under_tension_ms: f64,
    pub contractions: Vec<PerChannelContraction>,
    pub rms_temporal_stats: TemporalStat,
    pub mav_temporal_stats: TemporalStat,
    pub mpf_temporal_stats: TemporalStat,
    pub mdf_temporal_stats: TemporalStat,
    pub fatigue_index_temporal_stats: TemporalStat,
    pub mvc_threshold_actual_value: Option<f64>,
    pub mvc_estimation_method: MvcEstimationMethod,
    pub duration_threshold_actual_value: Option<f64>,
    pub signal_quality_score: f64,
    pub errors: HashMap<String, String>,
}

impl ChannelAnalytics {
    /// Invariant: good ≤ min(mvc_compliant, duration_compliant).
    pub fn good_count_invariant_holds(&self) -> bool {
        self.good_count <= self.mvc_compliant_count.min(self.duration_compliant_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MvcEstimationMethod {
    None,
    UserProvided,
    GlobalProvided,
    BackendEstimation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingParameters {
    pub session_id: Uuid,
    pub sampling_rate_hz: f64,
    pub filter_low_cutoff_hz: f64,
    pub filter_high_cutoff_hz: f64,
    pub filter_order: u32,
    pub rms_window_samples: usize,
    pub rms_overlap_samples: usize,
    pub mvc_window_samples: usize,
    pub mvc_threshold_percentage: f64,
    pub pipeline_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub session_id: Uuid,
    pub mvc_threshold_percentage: Option<f64>,
    pub duration_threshold_ms: Option<f64>,
    pub expected_contractions_per_muscle: u32,
    pub bfr_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BfrMeasurementMethod {
    Sensor,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BfrMonitoring {
    pub session_id: Uuid,
    pub channel: String,
    pub target_pressure_aop: Option<f64>,
    pub actual_pressure_aop: Option<f64>,
    pub cuff_pressure_mmhg: Option<f64>,
    pub systolic_bp: Option<f64>,
    pub diastolic_bp: Option<f64>,
    pub manual_compliance: Option<bool>,
    pub safety_compliant: Option<bool>,
    pub measurement_method: BfrMeasurementMethod,
    pub measured_at: Option<DateTime<Utc>>,
}

impl BfrMonitoring {
    /// Sensor-mode safety window is [40, 60] %AOP.
    /// Distinct from the *scoring* gate window [45, 55] used by C6.
    pub const SAFETY_RANGE: (f64, f64) = (40.0, 60.0);

    pub fn recompute_safety_compliant(&mut self) {
        if self.measurement_method == BfrMeasurementMethod::Sensor {
            self.safety_compliant = self.actual_pressure_aop.map(|p| {
                p >= Self::SAFETY_RANGE.0 && p <= Self::SAFETY_RANGE.1
            });
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceScores {
    pub session_id: Uuid,
    pub overall: Option<Score0100>,
    pub compliance: Option<Score0100>,
    pub symmetry: Option<Score0100>,
    pub effort: Option<Score0100>,
    pub game: Option<Score0100>,
    pub left_muscle_compliance: Option<Score0100>,
    pub right_muscle_compliance: Option<Score0100>,
    pub completion_rate_left: Rate01,
    pub intensity_rate_left: Rate01,
    pub duration_rate_left: Rate01,
    pub completion_rate_right: Rate01,
    pub intensity_rate_right: Rate01,
    pub duration_rate_right: Rate01,
    pub bfr_compliant: bool,
    pub rpe_post_session: Option<u8>,
    pub scoring_config_id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub compliance: f64,
    pub symmetry: f64,
    pub effort: f64,
    pub game: f64,
}

impl ScoringWeights {
    pub fn sum_within_tolerance(&self) -> bool {
        (self.compliance + self.symmetry + self.effort + self.game - 1.0).abs() <= 0.01
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComplianceSubWeights {
    pub completion: f64,
    pub intensity: f64,
    pub duration: f64,
}

impl ComplianceSubWeights {
    pub fn sum_within_tolerance(&self) -> bool {
        (self.completion + self.intensity + self.duration - 1.0).abs() <= 0.01
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpeBand {
    pub rpe_values: Vec<u8>,
    pub score: f64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpeMapping {
    pub bands: Vec<RpeBand>,
    pub default_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfiguration {
    pub id: Uuid,
    pub name: String,
    pub weights: ScoringWeights,
    pub sub_weights: ComplianceSubWeights,
    pub rpe_mapping: RpeMapping,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsCacheEntry {
    pub session_id: Uuid,
    pub analytics: serde_json::Value,
    pub summary: CacheSummary,
    pub c3d_metadata: serde_json::Value,
    pub cache_version: u32,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSummary {
    pub channels: Vec<String>,
    pub total_channels: usize,
    pub overall_compliance: Option<f64>,
    pub processed_at: DateTime<Utc>,
}

/// Per-muscle counters driving the scoring engine.
#[derive(Debug, Clone, Default)]
pub struct SessionMetrics {
    pub left_total: u32,
    pub left_good: u32,
    pub left_mvc_compliant: u32,
    pub left_duration_compliant: u32,
    pub right_total: u32,
    pub right_good: u32,
    pub right_mvc_compliant: u32,
    pub right_duration_compliant: u32,
    pub bfr_pressure_aop: Option<f64>,
    pub bfr_compliant: bool,
    pub rpe_post_session: Option<u8>,
    pub game_points_achieved: Option<u32>,
    pub game_points_max: Option<u32>,
    pub expected_contractions_per_muscle: u32,
}

impl Default for BfrMeasurementMethod {
    fn default() -> Self {
        BfrMeasurementMethod::Sensor
    }
}

impl Default for MvcEstimationMethod {
    fn default() -> Self {
        MvcEstimationMethod::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate01_clamps_above_one() {
        let r = Rate01::new(1.6);
        assert_eq!(r.get(), 1.0);
        assert!(Rate01::was_capped(1.6));
    }

    #[test]
    fn rate01_clamps_below_zero() {
        assert_eq!(Rate01::new(-0.2).get(), 0.0);
    }

    #[test]
    fn score_clamps_to_0_100() {
        assert_eq!(Score0100::new(150.0).get(), 100.0);
        assert_eq!(Score0100::new(-10.0).get(), 0.0);
    }

    #[test]
    fn status_transitions_are_monotonic() {
        assert!(SessionStatus::Pending.can_transition_to(SessionStatus::Processing));
        assert!(SessionStatus::Processing.can_transition_to(SessionStatus::Completed));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Processing));
        assert!(!SessionStatus::Failed.can_transition_to(SessionStatus::Completed));
    }

    #[test]
    fn bfr_safety_range_is_distinct_from_gate_range() {
        let mut bfr = BfrMonitoring {
            session_id: Uuid::nil(),
            channel: "CH1".into(),
            target_pressure_aop: None,
            actual_pressure_aop: Some(50.0),
            cuff_pressure_mmhg: None,
            systolic_bp: None,
            diastolic_bp: None,
            manual_compliance: None,
            safety_compliant: None,
            measurement_method: BfrMeasurementMethod::Sensor,
            measured_at: None,
        };
        bfr.recompute_safety_compliant();
        assert_eq!(bfr.safety_compliant, Some(true));

        bfr.actual_pressure_aop = Some(42.0);
        bfr.recompute_safety_compliant();
        // 42 is inside the wider [40,60] safety range even though it
        // would fail the narrower [45,55] scoring gate.
        assert_eq!(bfr.safety_compliant, Some(true));
    }
}
