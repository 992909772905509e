//! C2 — Signal Conditioner.
//!
//! Bandpass → full-wave rectify → moving-RMS envelope. The envelope is
//! the only signal downstream amplitude logic is allowed to see; the
//! raw signal is kept around only for full-signal spectral metrics.

mod filter;

pub use filter::{bandpass_filtfilt, BiquadCoeffs};

use thiserror::Error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConditioningError {
    #[error("sampling rate {rate} Hz is too low for a {cutoff} Hz high cutoff (Nyquist violation)")]
    InsufficientBandwidth { rate: u32, cutoff: u32 },
    #[error("clinical duration too short: {actual_samples} samples < {min_samples_required} required")]
    InsufficientDuration {
        actual_samples: usize,
        min_samples_required: usize,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalStats {
    pub mean: f64,
    pub std: f64,
}

impl SignalStats {
    fn compute(signal: &[f64]) -> Self {
        if signal.is_empty() {
            return Self { mean: 0.0, std: 0.0 };
        }
        let mean = signal.iter().sum::<f64>() / signal.len() as f64;
        let var = signal.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / signal.len() as f64;
        Self { mean, std: var.sqrt() }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConditioningStep {
    Bandpass,
    Rectify,
    Envelope,
}

#[derive(Debug, Clone)]
pub struct ConditioningReport {
    pub steps_applied: Vec<ConditioningStep>,
    pub window_samples: usize,
    pub input_stats: SignalStats,
    pub output_stats: SignalStats,
    pub valid: bool,
    pub low_cutoff_hz: f64,
    pub high_cutoff_hz: f64,
}

#[derive(Debug, Clone)]
pub struct ConditionedSignal {
    pub envelope: Vec<f64>,
    pub report: ConditioningReport,
}

/// Minimum clinically-valid sample count at a given sampling rate.
/// `min_clinical_duration_seconds` is a process config value (default
/// 5s); exposed as a free function so callers (and tests) can check
/// without a full conditioning pass.
pub fn min_samples_required(sampling_rate_hz: f64, min_clinical_duration_seconds: f64) -> usize {
    (sampling_rate_hz * min_clinical_duration_seconds).ceil().max(1.0) as usize
}

/// Run the full C2 pipeline on one channel's raw samples.
///
/// `window_ms` controls both the RMS envelope window and is reused
/// verbatim by the contraction detector's smoothing window.
pub fn condition(
    raw: &[f32],
    sampling_rate_hz: f64,
    low_cutoff_hz: f64,
    high_cutoff_hz_requested: f64,
    filter_order: u32,
    window_ms: f64,
    min_clinical_duration_seconds: f64,
) -> Result<ConditionedSignal, ConditioningError> {
    let nyquist = sampling_rate_hz / 2.0;
    if nyquist <= low_cutoff_hz {
        return Err(ConditioningError::InsufficientBandwidth {
            rate: sampling_rate_hz as u32,
            cutoff: high_cutoff_hz_requested as u32,
        });
    }

    let min_required = min_samples_required(sampling_rate_hz, min_clinical_duration_seconds);
    if raw.len() < min_required {
        return Err(ConditioningError::InsufficientDuration {
            actual_samples: raw.len(),
            min_samples_required: min_required,
        });
    }

    // High cutoff clamps to 0.9 * Nyquist when the requested cutoff
    // (default 500 Hz) would exceed it.
    let high_cutoff_hz = high_cutoff_hz_requested.min(0.9 * nyquist);

    let input_f64: Vec<f64> = raw.iter().map(|&v| f64::from(v)).collect();
    let input_stats = SignalStats::compute(&input_f64);

    let is_constant = input_stats.std == 0.0;

    let filtered = bandpass_filtfilt(&input_f64, low_cutoff_hz, high_cutoff_hz, sampling_rate_hz, filter_order);
    let rectified: Vec<f64> = filtered.iter().map(|v| v.abs()).collect();

    let window_samples = ((window_ms / 1000.0) * sampling_rate_hz).round().max(1.0) as usize;
    let envelope = moving_rms(&rectified, window_samples);
    let output_stats = SignalStats::compute(&envelope);

    let valid = !is_constant && !raw.is_empty() && output_stats.std.is_finite();

    Ok(ConditionedSignal {
        envelope,
        report: ConditioningReport {
            steps_applied: vec![
                ConditioningStep::Bandpass,
                ConditioningStep::Rectify,
                ConditioningStep::Envelope,
            ],
            window_samples,
            input_stats,
            output_stats,
            valid,
            low_cutoff_hz,
            high_cutoff_hz,
        },
    })
}

/// Moving RMS over a window of `window` samples (centered, clamped at
/// the edges) — reused identically by the contraction detector's
/// smoothing step.
pub fn moving_rms(signal: &[f64], window: usize) -> Vec<f64> {
    if signal.is_empty() {
        return Vec::new();
    }
    let window = window.max(1);
    let half = window / 2;

    // Prefix sum of squares lets each windowed RMS be an O(1) lookup
    // after the single O(n) pass below.
    let mut prefix = Vec::with_capacity(signal.len() + 1);
    prefix.push(0.0);
    for &v in signal {
        prefix.push(prefix.last().unwrap() + v * v);
    }

    let mut out = Vec::with_capacity(signal.len());
    for i in 0..signal.len() {
        let start = i.saturating_sub(half);
        let end = (i + half).min(signal.len() - 1);
        let count = (end - start + 1) as f64;
        let sum_sq = prefix[end + 1] - prefix[start];
        out.push((sum_sq / count).sqrt());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_burst(sampling_rate_hz: f64, seconds: f64) -> Vec<f32> {
        let n = (sampling_rate_hz * seconds) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / sampling_rate_hz;
                let burst = if (1.0..1.5).contains(&t) { 1.0 } else { 0.0 };
                ((t * 80.0 * std::f64::consts::TAU).sin() * burst) as f32
            })
            .collect()
    }

    #[test]
    fn rejects_insufficient_bandwidth_below_nyquist() {
        let raw = synthetic_burst(30.0, 6.0);
        let result = condition(&raw, 30.0, 20.0, 500.0, 4, 50.0, 5.0);
        assert!(matches!(result, Err(ConditioningError::InsufficientBandwidth { .. })));
    }

    #[test]
    fn clamps_high_cutoff_at_nyquist_boundary() {
        // 40 Hz sampling: Nyquist = 20Hz, low cutoff is 20Hz too, so
        // nyquist <= low_cutoff triggers InsufficientBandwidth.
        let raw = synthetic_burst(40.0, 6.0);
        let result = condition(&raw, 40.0, 20.0, 500.0, 4, 50.0, 5.0);
        assert!(matches!(result, Err(ConditioningError::InsufficientBandwidth { .. })));
    }

    #[test]
    fn rejects_insufficient_duration() {
        let raw = synthetic_burst(1000.0, 0.01);
        let result = condition(&raw, 1000.0, 20.0, 500.0, 4, 50.0, 5.0);
        assert!(matches!(result, Err(ConditioningError::InsufficientDuration { .. })));
    }

    #[test]
    fn happy_path_produces_valid_envelope_same_length() {
        let raw = synthetic_burst(1000.0, 6.0);
        let conditioned = condition(&raw, 1000.0, 20.0, 500.0, 4, 50.0, 5.0).unwrap();
        assert_eq!(conditioned.envelope.len(), raw.len());
        assert!(conditioned.report.valid);
    }

    #[test]
    fn rejects_all_constant_signal_as_invalid() {
        let raw = vec![0.5f32; 6000];
        let conditioned = condition(&raw, 1000.0, 20.0, 500.0, 4, 50.0, 5.0).unwrap();
        assert!(!conditioned.report.valid);
    }

    #[test]
    fn moving_rms_preserves_length() {
        let signal = vec![1.0; 200];
        let out = moving_rms(&signal, 50);
        assert_eq!(out.len(), signal.len());
    }
}
