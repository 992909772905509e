//! C4 — Channel Analytics.
//!
//! Combines the C3 contraction summary with temporal and frequency
//! metrics computed from the conditioned/raw signals into the single
//! per-channel record the scoring engine and API consume.

mod frequency;
mod temporal;

pub use frequency::{fatigue_index_nsm5, mean_power_frequency, median_power_frequency};
pub use temporal::{temporal_stat, MIN_TEMPORAL_WINDOWS_REQUIRED};

use crate::contraction::ContractionSummary;
use crate::signal::ConditioningReport;
use crate::types::{ChannelAnalytics, MvcEstimationMethod};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalyticsError {
    #[error("channel {channel} has no conditioned envelope to analyze")]
    MissingEnvelope { channel: String },
}

#[derive(Debug, Clone, Copy)]
pub struct AnalyticsWindows {
    pub rms_window_samples: usize,
    pub mav_window_samples: usize,
    pub spectral_window_samples: usize,
}

/// Build the full [`ChannelAnalytics`] record for one channel.
///
/// `mvc_threshold_actual_value` / `duration_threshold_actual_value` are
/// passed in already resolved by C5 — this module never decides
/// thresholds, only reports which ones were in effect.
#[allow(clippy::too_many_arguments)]
pub fn compute_channel_analytics(
    session_id: Uuid,
    channel_name: &str,
    envelope: &[f64],
    raw: &[f64],
    conditioning: &ConditioningReport,
    contractions: &ContractionSummary,
    sampling_rate_hz: f64,
    windows: AnalyticsWindows,
    mvc_threshold_actual_value: Option<f64>,
    mvc_estimation_method: MvcEstimationMethod,
    duration_threshold_actual_value: Option<f64>,
) -> Result<ChannelAnalytics, AnalyticsError> {
    if envelope.is_empty() {
        return Err(AnalyticsError::MissingEnvelope {
            channel: channel_name.to_string(),
        });
    }

    let rms_stats = temporal_stat(envelope, windows.rms_window_samples);
    let mav: Vec<f64> = envelope
        .chunks(windows.mav_window_samples.max(1))
        .map(|c| c.iter().map(|v| v.abs()).sum::<f64>() / c.len() as f64)
        .collect();
    let mav_stats = temporal_stat(&mav, 1);

    let spectral_window = windows.spectral_window_samples.max(1);
    let mpf_series: Vec<f64> = raw
        .chunks(spectral_window)
        .filter_map(|c| mean_power_frequency(c, sampling_rate_hz))
        .collect();
    let mdf_series: Vec<f64> = raw
        .chunks(spectral_window)
        .filter_map(|c| median_power_frequency(c, sampling_rate_hz))
        .collect();
    let mpf_stats = temporal_stat(&mpf_series, 1);
    let mdf_stats = temporal_stat(&mdf_series, 1);

    let fatigue_index = fatigue_index_nsm5(raw, sampling_rate_hz);
    let fatigue_index_temporal_stats = match fatigue_index {
        Some(v) => crate::types::TemporalStat {
            mean: Some(v),
            std: None,
            min: Some(v),
            max: Some(v),
            valid_windows: 1,
            coefficient_of_variation: None,
        },
        None => crate::types::TemporalStat::default(),
    };

    let signal_quality_score = if conditioning.valid { 100.0 } else { 0.0 };

    let mut errors = HashMap::new();
    if !conditioning.valid {
        errors.insert(
            "signal_quality".to_string(),
            "conditioned signal failed the clinical-validity check".to_string(),
        );
    }

    Ok(ChannelAnalytics {
        session_id,
        channel_name: channel_name.to_string(),
        contraction_count: contractions.contraction_count,
        mvc_compliant_count: contractions.mvc_compliant_count,
        duration_compliant_count: contractions.duration_compliant_count,
        good_count: contractions.good_count,
        avg_amplitude: contractions.avg_amplitude,
        max_amplitude: contractions.max_amplitude,
        avg_duration_ms: contractions.avg_duration_ms,
        min_duration_ms: contractions.min_duration_ms,
        max_duration_ms: contractions.max_duration_ms,
        total_time_under_tension_ms: contractions.total_time_under_tension_ms,
        contractions: contractions.contractions.clone(),
        rms_temporal_stats: rms_stats,
        mav_temporal_stats: mav_stats,
        mpf_temporal_stats: mpf_stats,
        mdf_temporal_stats: mdf_stats,
        fatigue_index_temporal_stats,
        mvc_threshold_actual_value,
        mvc_estimation_method,
        duration_threshold_actual_value,
        signal_quality_score,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalStats;

    fn dummy_report(valid: bool) -> ConditioningReport {
        ConditioningReport {
            steps_applied: vec![],
            window_samples: 50,
            input_stats: SignalStats { mean: 0.0, std: 1.0 },
            output_stats: SignalStats { mean: 0.0, std: 1.0 },
            valid,
            low_cutoff_hz: 20.0,
            high_cutoff_hz: 450.0,
        }
    }

    #[test]
    fn empty_envelope_is_rejected() {
        let contractions = ContractionSummary::default();
        let result = compute_channel_analytics(
            Uuid::nil(),
            "CH1",
            &[],
            &[],
            &dummy_report(true),
            &contractions,
            1000.0,
            AnalyticsWindows {
                rms_window_samples: 100,
                mav_window_samples: 100,
                spectral_window_samples: 256,
            },
            None,
            MvcEstimationMethod::None,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn invalid_conditioning_surfaces_as_error_entry() {
        let envelope = vec![0.1; 500];
        let raw: Vec<f64> = (0..500).map(|i| (i as f64 * 0.05).sin()).collect();
        let contractions = ContractionSummary::default();
        let analytics = compute_channel_analytics(
            Uuid::nil(),
            "CH1",
            &envelope,
            &raw,
            &dummy_report(false),
            &contractions,
            1000.0,
            AnalyticsWindows {
                rms_window_samples: 100,
                mav_window_samples: 100,
                spectral_window_samples: 256,
            },
            None,
            MvcEstimationMethod::None,
            None,
        )
        .unwrap();
        assert_eq!(analytics.signal_quality_score, 0.0);
        assert!(analytics.errors.contains_key("signal_quality"));
    }
}
