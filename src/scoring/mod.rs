//! C6 — Scoring Engine.
//!
//! Pure computation over [`SessionMetrics`] and a [`ScoringConfiguration`]
//! snapshot. Never touches the database or cache — the orchestrator
//! resolves which configuration snapshot applies (weight resolution
//! priority) and passes it in already loaded.

pub mod adherence;
pub mod rpe;
pub mod weights;

use crate::types::{ComplianceSubWeights, PerformanceScores, Rate01, Score0100, ScoringConfiguration, SessionMetrics};
use thiserror::Error;
use uuid::Uuid;
use weights::{components_from, weighted_overall};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScoringError {
    #[error("scoring weights do not sum to 1.0: {sum}")]
    InvalidWeights { sum: f64 },
}

struct MuscleRates {
    completion: Rate01,
    intensity: Rate01,
    duration: Rate01,
}

fn muscle_rates(total: u32, mvc_compliant: u32, duration_compliant: u32, expected: u32) -> MuscleRates {
    let expected = expected.max(1) as f64;
    let total_f = total as f64;

    let completion_raw = total_f / expected;
    let intensity_raw = if total == 0 { 0.0 } else { mvc_compliant as f64 / total_f };
    let duration_raw = if total == 0 { 0.0 } else { duration_compliant as f64 / total_f };

    MuscleRates {
        completion: Rate01::new(completion_raw),
        intensity: Rate01::new(intensity_raw),
        duration: Rate01::new(duration_raw),
    }
}

fn muscle_compliance(rates: &MuscleRates, sub_weights: &ComplianceSubWeights) -> f64 {
    100.0
        * (sub_weights.completion * rates.completion.get()
            + sub_weights.intensity * rates.intensity.get()
            + sub_weights.duration * rates.duration.get())
}

fn symmetry(left: f64, right: f64) -> f64 {
    if left + right <= 0.0 {
        0.0
    } else {
        (1.0 - (left - right).abs() / (left + right)) * 100.0
    }
}

/// BFR safety gate ∈ {0.0, 1.0}: passes when pressure is within the
/// scoring gate window, OR when there is no BFR data at all (a
/// non-BFR session is assumed compliant by default).
fn bfr_gate(pressure_aop: Option<f64>, gate_range: (f64, f64)) -> f64 {
    match pressure_aop {
        None => 1.0,
        Some(p) if p >= gate_range.0 && p <= gate_range.1 => 1.0,
        Some(_) => 0.0,
    }
}

fn game_score(points_achieved: Option<u32>, points_max: Option<u32>) -> Option<f64> {
    match (points_achieved, points_max) {
        (Some(achieved), Some(max)) if max > 0 => Some(100.0 * achieved as f64 / max as f64),
        _ => None,
    }
}

/// Run the full compliance/symmetry/effort/game/overall computation.
/// This is the single-pass path used the first time a session is
/// scored, with every input already present.
pub fn compute_scores(
    session_id: Uuid,
    metrics: &SessionMetrics,
    config: &ScoringConfiguration,
    bfr_gate_range: (f64, f64),
) -> Result<PerformanceScores, ScoringError> {
    if !config.weights.sum_within_tolerance() {
        return Err(ScoringError::InvalidWeights {
            sum: config.weights.compliance + config.weights.symmetry + config.weights.effort + config.weights.game,
        });
    }

    let left_rates = muscle_rates(
        metrics.left_total,
        metrics.left_mvc_compliant,
        metrics.left_duration_compliant,
        metrics.expected_contractions_per_muscle,
    );
    let right_rates = muscle_rates(
        metrics.right_total,
        metrics.right_mvc_compliant,
        metrics.right_duration_compliant,
        metrics.expected_contractions_per_muscle,
    );

    let left_compliance = muscle_compliance(&left_rates, &config.sub_weights);
    let right_compliance = muscle_compliance(&right_rates, &config.sub_weights);

    let gate = bfr_gate(metrics.bfr_pressure_aop, bfr_gate_range);
    let overall_compliance = Score0100::new(((left_compliance + right_compliance) / 2.0) * gate);
    let symmetry_score = Score0100::new(symmetry(left_compliance, right_compliance));
    let effort = rpe::effort_score(metrics.rpe_post_session, &config.rpe_mapping);
    let game = game_score(metrics.game_points_achieved, metrics.game_points_max);

    let components = components_from(
        Some(overall_compliance.get()),
        Some(symmetry_score.get()),
        effort,
        game,
        &config.weights,
    );
    let overall = weighted_overall(&components).map(Score0100::new);

    Ok(PerformanceScores {
        session_id,
        overall,
        compliance: Some(overall_compliance),
        symmetry: Some(symmetry_score),
        effort: effort.map(Score0100::new),
        game: game.map(Score0100::new),
        left_muscle_compliance: Some(Score0100::new(left_compliance)),
        right_muscle_compliance: Some(Score0100::new(right_compliance)),
        completion_rate_left: left_rates.completion,
        intensity_rate_left: left_rates.intensity,
        duration_rate_left: left_rates.duration,
        completion_rate_right: right_rates.completion,
        intensity_rate_right: right_rates.intensity,
        duration_rate_right: right_rates.duration,
        bfr_compliant: gate >= 1.0,
        rpe_post_session: metrics.rpe_post_session,
        scoring_config_id: config.id,
    })
}

/// Phase one of the two-phase webhook scoring flow: compliance and
/// symmetry are computable right after C1–C4 finish, before any
/// subjective data (RPE, game result) exists. Effort and game stay
/// null; overall is whatever weight redistribution yields from just
/// compliance and symmetry.
pub fn process_after_emg_analysis(
    session_id: Uuid,
    metrics: &SessionMetrics,
    config: &ScoringConfiguration,
    bfr_gate_range: (f64, f64),
) -> Result<PerformanceScores, ScoringError> {
    let mut metrics = metrics.clone();
    metrics.rpe_post_session = None;
    metrics.game_points_achieved = None;
    metrics.game_points_max = None;
    compute_scores(session_id, &metrics, config, bfr_gate_range)
}

/// Phase two: a therapist later records RPE/game results. Recompute
/// effort/game and overall in place, without touching compliance or
/// symmetry (no signal re-analysis happens here).
pub fn process_subjective_update(
    existing: &PerformanceScores,
    config: &ScoringConfiguration,
    rpe_post_session: Option<u8>,
    game_points_achieved: Option<u32>,
    game_points_max: Option<u32>,
) -> PerformanceScores {
    let effort = rpe::effort_score(rpe_post_session, &config.rpe_mapping);
    let game = game_score(game_points_achieved, game_points_max);

    let components = components_from(
        existing.compliance.map(Score0100::get),
        existing.symmetry.map(Score0100::get),
        effort,
        game,
        &config.weights,
    );
    let overall = weighted_overall(&components).map(Score0100::new);

    PerformanceScores {
        overall,
        effort: effort.map(Score0100::new),
        game: game.map(Score0100::new),
        rpe_post_session,
        ..existing.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::rpe::default_rpe_mapping;
    use crate::types::ScoringWeights;

    fn config() -> ScoringConfiguration {
        ScoringConfiguration {
            id: Uuid::nil(),
            name: "default".to_string(),
            weights: ScoringWeights {
                compliance: 0.50,
                symmetry: 0.25,
                effort: 0.25,
                game: 0.0,
            },
            sub_weights: ComplianceSubWeights {
                completion: 0.333,
                intensity: 0.333,
                duration: 0.334,
            },
            rpe_mapping: default_rpe_mapping(),
            active: true,
        }
    }

    fn metrics() -> SessionMetrics {
        SessionMetrics {
            left_total: 12,
            left_good: 10,
            left_mvc_compliant: 11,
            left_duration_compliant: 10,
            right_total: 12,
            right_good: 9,
            right_mvc_compliant: 10,
            right_duration_compliant: 9,
            bfr_pressure_aop: None,
            bfr_compliant: true,
            rpe_post_session: Some(5),
            game_points_achieved: None,
            game_points_max: None,
            expected_contractions_per_muscle: 12,
        }
    }

    #[test]
    fn no_bfr_data_assumes_compliant() {
        let scores = compute_scores(Uuid::nil(), &metrics(), &config(), (45.0, 55.0)).unwrap();
        assert!(scores.bfr_compliant);
        assert_eq!(scores.effort.unwrap().get(), 100.0);
        assert!(scores.overall.unwrap().get() > 0.0);
    }

    #[test]
    fn bfr_outside_gate_zeroes_compliance() {
        let mut m = metrics();
        m.bfr_pressure_aop = Some(70.0);
        let scores = compute_scores(Uuid::nil(), &m, &config(), (45.0, 55.0)).unwrap();
        assert!(!scores.bfr_compliant);
        assert_eq!(scores.compliance.unwrap().get(), 0.0);
    }

    #[test]
    fn zero_contractions_yield_zero_compliance_for_that_side() {
        let mut m = metrics();
        m.left_total = 0;
        m.left_mvc_compliant = 0;
        m.left_duration_compliant = 0;
        let scores = compute_scores(Uuid::nil(), &m, &config(), (45.0, 55.0)).unwrap();
        assert_eq!(scores.left_muscle_compliance.unwrap().get(), 0.0);
    }

    #[test]
    fn two_phase_flow_preserves_compliance_and_symmetry() {
        let phase_one = process_after_emg_analysis(Uuid::nil(), &metrics(), &config(), (45.0, 55.0)).unwrap();
        assert!(phase_one.effort.is_none());
        assert!(phase_one.game.is_none());

        let phase_two = process_subjective_update(&phase_one, &config(), Some(5), None, None);
        assert_eq!(phase_two.compliance, phase_one.compliance);
        assert_eq!(phase_two.symmetry, phase_one.symmetry);
        assert_eq!(phase_two.effort.unwrap().get(), 100.0);
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let mut bad_config = config();
        bad_config.weights.compliance = 0.9;
        let result = compute_scores(Uuid::nil(), &metrics(), &bad_config, (45.0, 55.0));
        assert!(matches!(result, Err(ScoringError::InvalidWeights { .. })));
    }
}
