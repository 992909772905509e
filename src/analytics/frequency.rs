//! Frequency-domain channel metrics: mean/median power frequency via a
//! periodogram PSD, and the FI_NSM5 fatigue index (normalized slope of
//! median frequency across five equal time segments).
//!
//! `rustfft` provides the FFT backing the periodogram.

use rustfft::{num_complex::Complex, FftPlanner};

/// Power spectral density via a single-window periodogram: FFT the
/// (mean-removed) signal, take squared magnitudes of the positive
/// half-spectrum.
fn periodogram(signal: &[f64], sampling_rate_hz: f64) -> (Vec<f64>, Vec<f64>) {
    let n = signal.len();
    if n < 2 {
        return (Vec::new(), Vec::new());
    }

    let mean = signal.iter().sum::<f64>() / n as f64;
    let mut buffer: Vec<Complex<f64>> = signal.iter().map(|&v| Complex::new(v - mean, 0.0)).collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    let half = n / 2;
    let freqs: Vec<f64> = (0..half).map(|k| k as f64 * sampling_rate_hz / n as f64).collect();
    let power: Vec<f64> = buffer[..half].iter().map(|c| c.norm_sqr()).collect();

    (freqs, power)
}

/// Mean power frequency: the power-weighted centroid of the spectrum.
pub fn mean_power_frequency(signal: &[f64], sampling_rate_hz: f64) -> Option<f64> {
    let (freqs, power) = periodogram(signal, sampling_rate_hz);
    let total: f64 = power.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let weighted: f64 = freqs.iter().zip(power.iter()).map(|(f, p)| f * p).sum();
    Some(weighted / total)
}

/// Median power frequency: the frequency splitting total spectral
/// power in half.
pub fn median_power_frequency(signal: &[f64], sampling_rate_hz: f64) -> Option<f64> {
    let (freqs, power) = periodogram(signal, sampling_rate_hz);
    let total: f64 = power.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let half_power = total / 2.0;
    let mut cumulative = 0.0;
    for (f, p) in freqs.iter().zip(power.iter()) {
        cumulative += p;
        if cumulative >= half_power {
            return Some(*f);
        }
    }
    freqs.last().copied()
}

/// FI_NSM5: split the raw signal into five equal segments, compute MDF
/// per segment, fit a line through (segment_index, mdf) and normalize
/// the slope by the first segment's MDF — a negative value means the
/// spectrum is shifting toward lower frequencies, the classical
/// myoelectric fatigue signature.
pub fn fatigue_index_nsm5(signal: &[f64], sampling_rate_hz: f64) -> Option<f64> {
    const SEGMENTS: usize = 5;
    if signal.len() < SEGMENTS * 2 {
        return None;
    }
    let seg_len = signal.len() / SEGMENTS;
    let mdfs: Vec<f64> = (0..SEGMENTS)
        .filter_map(|i| {
            let start = i * seg_len;
            let end = if i == SEGMENTS - 1 { signal.len() } else { start + seg_len };
            median_power_frequency(&signal[start..end], sampling_rate_hz)
        })
        .collect();

    if mdfs.len() < SEGMENTS {
        return None;
    }

    let first = mdfs[0];
    if first.abs() < f64::EPSILON {
        return None;
    }

    let slope = linear_regression_slope(&mdfs);
    Some(slope / first)
}

fn linear_regression_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let xs: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = values.iter().sum::<f64>() / n;

    let numerator: f64 = xs.iter().zip(values.iter()).map(|(x, y)| (x - x_mean) * (y - y_mean)).sum();
    let denominator: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();

    if denominator.abs() < f64::EPSILON {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_wave(freq_hz: f64, sampling_rate_hz: f64, seconds: f64) -> Vec<f64> {
        let n = (sampling_rate_hz * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq_hz * i as f64 / sampling_rate_hz).sin())
            .collect()
    }

    #[test]
    fn mean_power_frequency_matches_pure_tone() {
        let signal = sine_wave(50.0, 1000.0, 2.0);
        let mpf = mean_power_frequency(&signal, 1000.0).unwrap();
        assert!((mpf - 50.0).abs() < 2.0, "expected ~50Hz, got {mpf}");
    }

    #[test]
    fn median_power_frequency_matches_pure_tone() {
        let signal = sine_wave(80.0, 1000.0, 2.0);
        let mdf = median_power_frequency(&signal, 1000.0).unwrap();
        assert!((mdf - 80.0).abs() < 2.0, "expected ~80Hz, got {mdf}");
    }

    #[test]
    fn silent_signal_yields_no_frequency_stats() {
        let signal = vec![0.0; 2000];
        assert!(mean_power_frequency(&signal, 1000.0).is_none());
    }

    #[test]
    fn too_short_signal_yields_no_fatigue_index() {
        let signal = vec![1.0, 2.0, 3.0];
        assert!(fatigue_index_nsm5(&signal, 1000.0).is_none());
    }
}
