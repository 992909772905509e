//! C5 — MVC Estimator.
//!
//! Resolves the amplitude threshold a channel's contractions are
//! judged against, following a strict priority chain: an explicit
//! per-muscle value always wins over a session-wide default, which in
//! turn wins over the backend's own statistical estimate from the
//! channel's own signal.

use crate::types::MvcEstimationMethod;
use statrs::statistics::{Data, OrderStatistics};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MvcError {
    #[error("cannot estimate MVC from an empty signal")]
    EmptySignal,
}

#[derive(Debug, Clone, Copy)]
pub struct MvcThresholdInputs {
    pub per_muscle_mvc: Option<f64>,
    pub global_mvc: Option<f64>,
    pub mvc_threshold_percentage: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct MvcResolution {
    pub threshold_value: f64,
    pub method: MvcEstimationMethod,
}

/// Percentile used for the backend's own MVC estimate when no
/// explicit value is configured anywhere in the priority chain.
const BACKEND_ESTIMATION_PERCENTILE: f64 = 95.0;

/// Resolve the amplitude threshold a channel's contractions will be
/// judged against, given the rectified envelope to fall back to a
/// statistical estimate from when nothing else is configured.
pub fn resolve_mvc_threshold(
    inputs: &MvcThresholdInputs,
    rectified_envelope: &[f64],
) -> Result<MvcResolution, MvcError> {
    if let Some(value) = inputs.per_muscle_mvc {
        return Ok(MvcResolution {
            threshold_value: value * inputs.mvc_threshold_percentage,
            method: MvcEstimationMethod::UserProvided,
        });
    }

    if let Some(value) = inputs.global_mvc {
        return Ok(MvcResolution {
            threshold_value: value * inputs.mvc_threshold_percentage,
            method: MvcEstimationMethod::GlobalProvided,
        });
    }

    let estimated = estimate_mvc_from_signal(rectified_envelope)?;
    Ok(MvcResolution {
        threshold_value: estimated * inputs.mvc_threshold_percentage,
        method: MvcEstimationMethod::BackendEstimation,
    })
}

/// Standalone calibration operation: estimate a channel's MVC purely
/// from its own rectified signal, independent of any session context.
/// Used by the API's dedicated calibration endpoint.
pub fn estimate_mvc_from_signal(rectified_envelope: &[f64]) -> Result<f64, MvcError> {
    if rectified_envelope.is_empty() {
        return Err(MvcError::EmptySignal);
    }
    let mut data = Data::new(rectified_envelope.to_vec());
    Ok(data.percentile(BACKEND_ESTIMATION_PERCENTILE as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_muscle_value_wins_over_everything_else() {
        let inputs = MvcThresholdInputs {
            per_muscle_mvc: Some(100.0),
            global_mvc: Some(50.0),
            mvc_threshold_percentage: 0.75,
        };
        let resolution = resolve_mvc_threshold(&inputs, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(resolution.threshold_value, 75.0);
        assert_eq!(resolution.method, MvcEstimationMethod::UserProvided);
    }

    #[test]
    fn global_value_wins_when_no_per_muscle_value() {
        let inputs = MvcThresholdInputs {
            per_muscle_mvc: None,
            global_mvc: Some(40.0),
            mvc_threshold_percentage: 0.5,
        };
        let resolution = resolve_mvc_threshold(&inputs, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(resolution.threshold_value, 20.0);
        assert_eq!(resolution.method, MvcEstimationMethod::GlobalProvided);
    }

    #[test]
    fn backend_estimates_when_nothing_configured() {
        let inputs = MvcThresholdInputs {
            per_muscle_mvc: None,
            global_mvc: None,
            mvc_threshold_percentage: 1.0,
        };
        let envelope: Vec<f64> = (0..100).map(f64::from).collect();
        let resolution = resolve_mvc_threshold(&inputs, &envelope).unwrap();
        assert_eq!(resolution.method, MvcEstimationMethod::BackendEstimation);
        assert!(resolution.threshold_value > 80.0);
    }

    #[test]
    fn empty_signal_with_no_config_errors() {
        let inputs = MvcThresholdInputs {
            per_muscle_mvc: None,
            global_mvc: None,
            mvc_threshold_percentage: 1.0,
        };
        let result = resolve_mvc_threshold(&inputs, &[]);
        assert!(matches!(result, Err(MvcError::EmptySignal)));
    }
}
