//! Weight redistribution: when a scoring component is null (no BFR
//! data is not this — that's the gate; a null component is e.g.
//! missing RPE or missing game data), its weight is redistributed
//! proportionally across the components that ARE present so the
//! effective weights always sum to 1.0.

use crate::types::ScoringWeights;

pub struct WeightedComponent {
    pub value: Option<f64>,
    pub weight: f64,
}

/// Redistribute weight from absent components across present ones,
/// then return the weighted sum. Returns `None` only when every
/// component is absent (nothing to average).
pub fn weighted_overall(components: &[WeightedComponent]) -> Option<f64> {
    let present_weight: f64 = components.iter().filter(|c| c.value.is_some()).map(|c| c.weight).sum();
    if present_weight <= 0.0 {
        return None;
    }

    let sum: f64 = components
        .iter()
        .filter_map(|c| c.value.map(|v| v * (c.weight / present_weight)))
        .sum();
    Some(sum)
}

pub fn components_from(
    compliance: Option<f64>,
    symmetry: Option<f64>,
    effort: Option<f64>,
    game: Option<f64>,
    weights: &ScoringWeights,
) -> Vec<WeightedComponent> {
    vec![
        WeightedComponent {
            value: compliance,
            weight: weights.compliance,
        },
        WeightedComponent {
            value: symmetry,
            weight: weights.symmetry,
        },
        WeightedComponent {
            value: effort,
            weight: weights.effort,
        },
        WeightedComponent {
            value: game,
            weight: weights.game,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_weights() -> ScoringWeights {
        ScoringWeights {
            compliance: 0.50,
            symmetry: 0.25,
            effort: 0.25,
            game: 0.0,
        }
    }

    #[test]
    fn all_present_weights_sum_to_plain_weighted_average() {
        let components = components_from(Some(80.0), Some(90.0), Some(100.0), None, &default_weights());
        let overall = weighted_overall(&components).unwrap();
        // game weight 0.0 + absent, so only compliance/symmetry/effort matter.
        let expected = 0.50 * 80.0 + 0.25 * 90.0 + 0.25 * 100.0;
        assert!((overall - expected).abs() < 1e-9);
    }

    #[test]
    fn missing_effort_redistributes_its_weight() {
        let components = components_from(Some(80.0), Some(90.0), None, None, &default_weights());
        let overall = weighted_overall(&components).unwrap();
        // present weight = 0.75; compliance gets 0.50/0.75, symmetry 0.25/0.75.
        let expected = (0.50 / 0.75) * 80.0 + (0.25 / 0.75) * 90.0;
        assert!((overall - expected).abs() < 1e-9);
    }

    #[test]
    fn everything_absent_yields_none() {
        let components = components_from(None, None, None, None, &default_weights());
        assert!(weighted_overall(&components).is_none());
    }
}
