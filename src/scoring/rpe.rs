//! RPE (Borg CR10) → effort score lookup.

use crate::types::RpeMapping;

/// Default bands: optimal [4,6]→100, acceptable {3,7}→80,
/// suboptimal {2,8}→60, poor {0,1,9,10}→20.
pub fn default_rpe_mapping() -> RpeMapping {
    use crate::types::RpeBand;
    RpeMapping {
        bands: vec![
            RpeBand {
                rpe_values: vec![4, 5, 6],
                score: 100.0,
                label: "optimal".to_string(),
            },
            RpeBand {
                rpe_values: vec![3, 7],
                score: 80.0,
                label: "acceptable".to_string(),
            },
            RpeBand {
                rpe_values: vec![2, 8],
                score: 60.0,
                label: "suboptimal".to_string(),
            },
            RpeBand {
                rpe_values: vec![0, 1, 9, 10],
                score: 20.0,
                label: "poor".to_string(),
            },
        ],
        default_score: 20.0,
    }
}

/// Looks up the effort score for a given RPE value. Returns `None`
/// when `rpe` is absent — effort has no default, unlike every other
/// component.
pub fn effort_score(rpe: Option<u8>, mapping: &RpeMapping) -> Option<f64> {
    let rpe = rpe?;
    mapping
        .bands
        .iter()
        .find(|band| band.rpe_values.contains(&rpe))
        .map(|band| band.score)
        .or(Some(mapping.default_score))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimal_band_scores_100() {
        let mapping = default_rpe_mapping();
        assert_eq!(effort_score(Some(5), &mapping), Some(100.0));
    }

    #[test]
    fn poor_band_scores_20() {
        let mapping = default_rpe_mapping();
        assert_eq!(effort_score(Some(0), &mapping), Some(20.0));
        assert_eq!(effort_score(Some(10), &mapping), Some(20.0));
    }

    #[test]
    fn absent_rpe_is_none_never_a_default() {
        let mapping = default_rpe_mapping();
        assert_eq!(effort_score(None, &mapping), None);
    }
}
