//! Longitudinal adherence scoring — a read-side query over completed
//! sessions, not part of the per-session write path.

use serde::{Deserialize, Serialize};

/// Expected sessions baseline: 5 days × 3 sessions/day × 2 games.
pub const EXPECTED_SESSIONS_BASELINE: u32 = 30;

/// Adherence is not meaningful until at least 3 protocol days have
/// elapsed — fewer days makes the ratio noise, not a trend.
const MIN_PROTOCOL_DAY: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdherenceCategory {
    Excellent,
    Good,
    Moderate,
    Poor,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdherenceScore {
    pub percentage: f64,
    pub category: AdherenceCategory,
}

impl AdherenceCategory {
    fn from_percentage(pct: f64) -> Self {
        if pct >= 85.0 {
            AdherenceCategory::Excellent
        } else if pct >= 70.0 {
            AdherenceCategory::Good
        } else if pct >= 50.0 {
            AdherenceCategory::Moderate
        } else {
            AdherenceCategory::Poor
        }
    }
}

/// `protocol_day` is the current day in the patient's protocol (1-indexed).
/// Returns `None` before [`MIN_PROTOCOL_DAY`] — too early to be meaningful.
pub fn calculate_adherence_score(
    completed_sessions: u32,
    protocol_day: u32,
    expected_sessions_baseline: u32,
) -> Option<AdherenceScore> {
    if protocol_day < MIN_PROTOCOL_DAY {
        return None;
    }

    let baseline = expected_sessions_baseline.max(1);
    let expected_so_far = (baseline as f64 * protocol_day as f64 / 5.0).min(baseline as f64);
    let percentage = if expected_so_far > 0.0 {
        (completed_sessions as f64 / expected_so_far * 100.0).min(100.0)
    } else {
        0.0
    };

    Some(AdherenceScore {
        percentage,
        category: AdherenceCategory::from_percentage(percentage),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_early_in_protocol_yields_none() {
        assert!(calculate_adherence_score(2, 2, EXPECTED_SESSIONS_BASELINE).is_none());
    }

    #[test]
    fn on_pace_sessions_score_excellent() {
        // Day 5, all 30 expected sessions done.
        let score = calculate_adherence_score(30, 5, EXPECTED_SESSIONS_BASELINE).unwrap();
        assert_eq!(score.category, AdherenceCategory::Excellent);
    }

    #[test]
    fn far_behind_scores_poor() {
        let score = calculate_adherence_score(1, 5, EXPECTED_SESSIONS_BASELINE).unwrap();
        assert_eq!(score.category, AdherenceCategory::Poor);
    }
}
