//! Sliding-window temporal statistics (mean/std/min/max/CV) computed
//! over non-overlapping windows of a per-sample metric series.

use crate::types::TemporalStat;

/// A temporal stat is only reported when at least this many windows
/// produced a finite value — fewer windows makes mean/std unstable
/// noise rather than a clinically meaningful trend.
pub const MIN_TEMPORAL_WINDOWS_REQUIRED: usize = 3;

/// Split `series` into `window_samples`-sized chunks, average each
/// chunk, then summarize the resulting per-window values.
pub fn temporal_stat(series: &[f64], window_samples: usize) -> TemporalStat {
    if window_samples == 0 || series.is_empty() {
        return TemporalStat::default();
    }

    let window_means: Vec<f64> = series
        .chunks(window_samples)
        .map(|chunk| chunk.iter().sum::<f64>() / chunk.len() as f64)
        .filter(|v| v.is_finite())
        .collect();

    if window_means.len() < MIN_TEMPORAL_WINDOWS_REQUIRED {
        return TemporalStat {
            valid_windows: window_means.len(),
            ..TemporalStat::default()
        };
    }

    let n = window_means.len() as f64;
    let mean = window_means.iter().sum::<f64>() / n;
    let variance = window_means.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    let min = window_means.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = window_means.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let coefficient_of_variation = if mean.abs() > f64::EPSILON {
        Some(std / mean.abs())
    } else {
        None
    };

    TemporalStat {
        mean: Some(mean),
        std: Some(std),
        min: Some(min),
        max: Some(max),
        valid_windows: window_means.len(),
        coefficient_of_variation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_minimum_windows_yields_no_stats() {
        let series = vec![1.0, 2.0];
        let stat = temporal_stat(&series, 1);
        assert!(stat.mean.is_none());
        assert_eq!(stat.valid_windows, 2);
    }

    #[test]
    fn enough_windows_produces_full_stats() {
        let series = vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0];
        let stat = temporal_stat(&series, 2);
        assert_eq!(stat.valid_windows, 3);
        assert!(stat.mean.is_some());
        assert!(stat.coefficient_of_variation.is_some());
    }

    #[test]
    fn empty_series_yields_default() {
        let stat = temporal_stat(&[], 10);
        assert_eq!(stat.valid_windows, 0);
    }
}
