//! C3 — Contraction Detector.
//!
//! Dual-signal gating: an optional "activated" sibling drives timing
//! edges at a lower relative threshold, while amplitude is always read
//! from the conditioned envelope. Modeled as an ordered sequence of
//! gates — each gate either narrows the candidate region list or
//! leaves a channel-level error breadcrumb.

use crate::types::PerChannelContraction;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("no raw signal available for contraction detection")]
    NoRawSignal,
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionParams {
    pub threshold_factor: f64,
    pub activated_threshold_factor: f64,
    pub min_duration_ms: f64,
    pub merge_threshold_ms: f64,
    pub refractory_period_ms: f64,
    pub mvc_amplitude_threshold: Option<f64>,
    pub duration_threshold_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractionSummary {
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
}

#[derive(Debug, Clone, Copy)]
struct Region {
    start_idx: usize,
    end_idx: usize,
}

fn above_threshold_regions(signal: &[f64], threshold: f64) -> Vec<Region> {
    let mut regions = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &v) in signal.iter().enumerate() {
        if v >= threshold {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            regions.push(Region { start_idx: s, end_idx: i - 1 });
        }
    }
    if let Some(s) = start {
        regions.push(Region {
            start_idx: s,
            end_idx: signal.len() - 1,
        });
    }
    regions
}

fn region_duration_ms(r: &Region, sampling_rate_hz: f64) -> f64 {
    ((r.end_idx - r.start_idx + 1) as f64 / sampling_rate_hz) * 1000.0
}

fn merge_adjacent(regions: Vec<Region>, merge_threshold_ms: f64, sampling_rate_hz: f64) -> Vec<Region> {
    if regions.is_empty() {
        return regions;
    }
    let gap_samples = ((merge_threshold_ms / 1000.0) * sampling_rate_hz) as usize;
    let mut merged: Vec<Region> = Vec::with_capacity(regions.len());
    let mut current = regions[0];
    for next in regions.into_iter().skip(1) {
        if next.start_idx.saturating_sub(current.end_idx) <= gap_samples {
            current.end_idx = next.end_idx;
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);
    merged
}

fn enforce_refractory(regions: Vec<Region>, refractory_ms: f64, sampling_rate_hz: f64) -> Vec<Region> {
    if regions.is_empty() {
        return regions;
    }
    let refractory_samples = ((refractory_ms / 1000.0) * sampling_rate_hz) as usize;
    let mut accepted: Vec<Region> = Vec::with_capacity(regions.len());
    let mut last_end: Option<usize> = None;
    for r in regions {
        if let Some(end) = last_end {
            if r.start_idx.saturating_sub(end) < refractory_samples {
                continue;
            }
        }
        last_end = Some(r.end_idx);
        accepted.push(r);
    }
    accepted
}

fn classify(max_amplitude: f64, duration_ms: f64, params: &DetectionParams) -> (bool, bool, bool) {
    let meets_mvc = params
        .mvc_amplitude_threshold
        .is_some_and(|t| max_amplitude >= t);
    let meets_duration = params
        .duration_threshold_ms
        .is_some_and(|t| duration_ms >= t);

    let is_good = match (params.mvc_amplitude_threshold, params.duration_threshold_ms) {
        (Some(_), Some(_)) => meets_mvc && meets_duration,
        (Some(_), None) => meets_mvc,
        (None, Some(_)) => meets_duration,
        (None, None) => false,
    };

    (meets_mvc, meets_duration, is_good)
}

/// Run the full detection algorithm: threshold crossing, duration
/// gating, merge, and refractory period.
///
/// `envelope` is the conditioned amplitude signal (always used for
/// amplitude); `timing_signal` is the optional
/// "activated" sibling used only for edge timing (step 1).
pub fn analyze_contractions(
    envelope: &[f64],
    timing_signal: Option<&[f64]>,
    sampling_rate_hz: f64,
    params: &DetectionParams,
) -> Result<ContractionSummary, DetectionError> {
    if envelope.is_empty() {
        return Err(DetectionError::NoRawSignal);
    }

    let (timing, factor) = match timing_signal {
        Some(sig) if !sig.is_empty() => (sig, params.activated_threshold_factor),
        _ => (envelope, params.threshold_factor),
    };

    let timing_max = timing.iter().cloned().fold(0.0_f64, f64::max);
    let threshold = timing_max * factor;

    let regions = above_threshold_regions(timing, threshold);
    let regions: Vec<Region> = regions
        .into_iter()
        .filter(|r| region_duration_ms(r, sampling_rate_hz) >= params.min_duration_ms)
        .collect();
    let regions = merge_adjacent(regions, params.merge_threshold_ms, sampling_rate_hz);
    let regions = enforce_refractory(regions, params.refractory_period_ms, sampling_rate_hz);

    let mut contractions = Vec::with_capacity(regions.len());
    let mut mvc_compliant = 0usize;
    let mut duration_compliant = 0usize;
    let mut good = 0usize;

    for r in &regions {
        // Clamp region indices into envelope bounds — the timing
        // signal and envelope are the same length in practice, but we
        // never index past whichever is shorter.
        let end = r.end_idx.min(envelope.len() - 1);
        let start = r.start_idx.min(end);
        let amp_slice = &envelope[start..=end];
        let max_amplitude = amp_slice.iter().cloned().fold(0.0_f64, f64::max);
        let mean_amplitude = amp_slice.iter().sum::<f64>() / amp_slice.len() as f64;
        let duration_ms = region_duration_ms(r, sampling_rate_hz);
        let start_ms = (start as f64 / sampling_rate_hz) * 1000.0;
        let end_ms = (end as f64 / sampling_rate_hz) * 1000.0;

        let (meets_mvc, meets_duration, is_good) = classify(max_amplitude, duration_ms, params);
        if meets_mvc {
            mvc_compliant += 1;
        }
        if meets_duration {
            duration_compliant += 1;
        }
        if is_good {
            good += 1;
        }

        contractions.push(PerChannelContraction {
            start_ms,
            end_ms,
            duration_ms,
            mean_amplitude,
            max_amplitude,
            meets_mvc,
            meets_duration,
            is_good,
        });
    }

    let durations: Vec<f64> = contractions.iter().map(|c| c.duration_ms).collect();
    let amplitudes: Vec<f64> = contractions.iter().map(|c| c.max_amplitude).collect();

    let avg_duration_ms = mean(&durations);
    let min_duration_ms = durations.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_duration_ms = durations.iter().cloned().fold(0.0, f64::max);
    let total_time_under_tension_ms: f64 = durations.iter().sum();
    let avg_amplitude = mean(&amplitudes);
    let max_amplitude = amplitudes.iter().cloned().fold(0.0, f64::max);

    Ok(ContractionSummary {
        contraction_count: contractions.len(),
        mvc_compliant_count: mvc_compliant,
        duration_compliant_count: duration_compliant,
        good_count: good,
        avg_amplitude,
        max_amplitude,
        avg_duration_ms,
        min_duration_ms: if min_duration_ms.is_finite() { min_duration_ms } else { 0.0 },
        max_duration_ms,
        total_time_under_tension_ms,
        contractions,
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bursty_envelope(n: usize, burst_ranges: &[(usize, usize)]) -> Vec<f64> {
        let mut signal = vec![0.01; n];
        for &(start, end) in burst_ranges {
            for v in signal.iter_mut().take(end).skip(start) {
                *v = 1.0;
            }
        }
        signal
    }

    fn default_params() -> DetectionParams {
        DetectionParams {
            threshold_factor: 0.10,
            activated_threshold_factor: 0.05,
            min_duration_ms: 100.0,
            merge_threshold_ms: 200.0,
            refractory_period_ms: 50.0,
            mvc_amplitude_threshold: Some(0.8),
            duration_threshold_ms: Some(150.0),
        }
    }

    #[test]
    fn empty_envelope_errors() {
        let result = analyze_contractions(&[], None, 1000.0, &default_params());
        assert!(matches!(result, Err(DetectionError::NoRawSignal)));
    }

    #[test]
    fn detects_single_sustained_burst() {
        // 300ms burst at 1000Hz => 300 samples above threshold.
        let signal = bursty_envelope(1000, &[(100, 400)]);
        let summary = analyze_contractions(&signal, None, 1000.0, &default_params()).unwrap();
        assert_eq!(summary.contraction_count, 1);
        assert!(summary.contractions[0].meets_mvc);
        assert!(summary.contractions[0].meets_duration);
        assert!(summary.contractions[0].is_good);
    }

    #[test]
    fn discards_regions_shorter_than_min_duration() {
        // 20ms burst only.
        let signal = bursty_envelope(1000, &[(100, 120)]);
        let summary = analyze_contractions(&signal, None, 1000.0, &default_params()).unwrap();
        assert_eq!(summary.contraction_count, 0);
    }

    #[test]
    fn merges_closely_spaced_bursts() {
        // Two 150ms bursts separated by 50ms gap (< 200ms merge threshold).
        let signal = bursty_envelope(1000, &[(100, 250), (300, 450)]);
        let summary = analyze_contractions(&signal, None, 1000.0, &default_params()).unwrap();
        assert_eq!(summary.contraction_count, 1);
    }

    #[test]
    fn good_count_never_exceeds_mvc_or_duration_compliant() {
        let signal = bursty_envelope(2000, &[(100, 250), (900, 1000), (1500, 1900)]);
        let params = DetectionParams {
            mvc_amplitude_threshold: Some(1.5), // nothing meets this
            ..default_params()
        };
        let summary = analyze_contractions(&signal, None, 1000.0, &params).unwrap();
        assert!(summary.good_count <= summary.mvc_compliant_count.min(summary.duration_compliant_count));
        assert_eq!(summary.mvc_compliant_count, 0);
    }

    #[test]
    fn no_thresholds_means_never_good() {
        let signal = bursty_envelope(1000, &[(100, 400)]);
        let params = DetectionParams {
            mvc_amplitude_threshold: None,
            duration_threshold_ms: None,
            ..default_params()
        };
        let summary = analyze_contractions(&signal, None, 1000.0, &params).unwrap();
        assert_eq!(summary.good_count, 0);
    }
}
