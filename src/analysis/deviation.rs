use rayon::prelude::*;

use super::model::{FrameMeasurement, FrameSeries};
use crate::audio::frames::hann_window;
use crate::error::{AnalysisError, Result};

/// Smallest RMS baseline used as a divisor.
pub const BASELINE_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaselineMode {
    /// Median of all voiced frequencies in the clip.
    GlobalMedian,
    /// Caller-supplied reference in Hz.
    Reference(f64),
    /// Centered median over voiced frequencies within `seconds` around each frame.
    Rolling { seconds: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviationParams {
    pub baseline: BaselineMode,
    /// Hann taps applied to the cents contour inside voiced runs; <= 1 disables.
    pub pitch_smoothing: usize,
    /// Hann taps applied to the RMS envelope; <= 1 disables.
    pub amplitude_smoothing: usize,
    /// Length of the trailing mean used as the amplitude baseline.
    pub amplitude_baseline_seconds: f64,
}

impl Default for DeviationParams {
    fn default() -> Self {
        Self {
            baseline: BaselineMode::GlobalMedian,
            pitch_smoothing: 11,
            amplitude_smoothing: 21,
            amplitude_baseline_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deviations {
    pub series: FrameSeries,
    /// Reference pitch in Hz (median of per-frame baselines for rolling mode).
    pub baseline_hz: f64,
}

pub fn compute_deviations(
    frames: &[FrameMeasurement],
    hop_duration: f64,
    params: &DeviationParams,
) -> Result<Deviations> {
    if !(hop_duration > 0.0) {
        return Err(AnalysisError::InvalidRange(format!(
            "hop duration must be positive, got {hop_duration}"
        )));
    }

    let n = frames.len();
    let voiced: Vec<bool> = frames
        .iter()
        .map(|f| f.voiced && f.frequency.is_finite() && f.frequency > 0.0)
        .collect();
    let voiced_count = voiced.iter().filter(|&&v| v).count();
    if voiced_count < 2 {
        return Err(AnalysisError::InsufficientVoicing { voiced: voiced_count, total: n });
    }

    let times: Vec<f64> = (0..n).map(|i| i as f64 * hop_duration).collect();

    let baselines = pitch_baselines(frames, &voiced, hop_duration, params.baseline)?;
    let baseline_hz = {
        let mut voiced_baselines: Vec<f64> = baselines
            .iter()
            .zip(&voiced)
            .filter(|(_, &v)| v)
            .map(|(&b, _)| b)
            .collect();
        median(&mut voiced_baselines)
    };

    // Frames only read their own baseline, so this map is order-free.
    let raw_cents: Vec<f64> = frames
        .par_iter()
        .zip(baselines.par_iter())
        .zip(voiced.par_iter())
        .map(|((frame, &base), &is_voiced)| {
            if is_voiced {
                1200.0 * (frame.frequency as f64 / base).log2()
            } else {
                0.0
            }
        })
        .collect();
    let pitch_deviation = smooth_voiced_runs(&raw_cents, &voiced, params.pitch_smoothing);

    let rms: Vec<f64> = frames.iter().map(|f| f.rms.max(0.0) as f64).collect();
    let rms_smooth = smooth_span(&rms, params.amplitude_smoothing);
    let window = ((params.amplitude_baseline_seconds / hop_duration).round() as usize).max(1);
    let rms_baseline = trailing_mean(&rms_smooth, window);
    let amplitude_deviation = rms_smooth
        .iter()
        .zip(&rms_baseline)
        .map(|(&value, &base)| {
            let base = base.max(BASELINE_FLOOR);
            100.0 * (value - base) / base
        })
        .collect();
    let amplitude = normalize_unit(&rms_smooth);

    Ok(Deviations {
        series: FrameSeries {
            times,
            pitch_deviation,
            amplitude_deviation,
            amplitude,
            voiced,
        },
        baseline_hz,
    })
}

fn pitch_baselines(
    frames: &[FrameMeasurement],
    voiced: &[bool],
    hop_duration: f64,
    mode: BaselineMode,
) -> Result<Vec<f64>> {
    let n = frames.len();
    match mode {
        BaselineMode::GlobalMedian => {
            let mut freqs = voiced_frequencies(frames, voiced, 0, n);
            Ok(vec![median(&mut freqs); n])
        }
        BaselineMode::Reference(hz) => {
            if !(hz.is_finite() && hz > 0.0) {
                return Err(AnalysisError::InvalidRange(format!(
                    "reference pitch must be a positive frequency, got {hz}"
                )));
            }
            Ok(vec![hz; n])
        }
        BaselineMode::Rolling { seconds } => {
            let half = ((seconds / hop_duration / 2.0).round() as usize).max(1);
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                let start = i.saturating_sub(half);
                let end = (i + half + 1).min(n);
                let mut freqs = voiced_frequencies(frames, voiced, start, end);
                out.push(if freqs.is_empty() { 0.0 } else { median(&mut freqs) });
            }
            Ok(out)
        }
    }
}

fn voiced_frequencies(
    frames: &[FrameMeasurement],
    voiced: &[bool],
    start: usize,
    end: usize,
) -> Vec<f64> {
    frames[start..end]
        .iter()
        .zip(&voiced[start..end])
        .filter(|(_, &v)| v)
        .map(|(f, _)| f.frequency as f64)
        .collect()
}

pub(crate) fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) * 0.5
    } else {
        values[mid]
    }
}

/// Hann smoothing restricted to each contiguous voiced run. Weights are
/// renormalized where the kernel overhangs a run edge, so edges keep their
/// level instead of being pulled toward zero.
fn smooth_voiced_runs(values: &[f64], voiced: &[bool], taps: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    if taps <= 1 {
        return out;
    }
    let kernel: Vec<f64> = hann_window(taps).into_iter().map(f64::from).collect();
    let mut i = 0;
    while i < values.len() {
        if !voiced[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < values.len() && voiced[i] {
            i += 1;
        }
        let smoothed = convolve_renormalized(&values[start..i], &kernel);
        out[start..i].copy_from_slice(&smoothed);
    }
    out
}

fn smooth_span(values: &[f64], taps: usize) -> Vec<f64> {
    if taps <= 1 {
        return values.to_vec();
    }
    let kernel: Vec<f64> = hann_window(taps).into_iter().map(f64::from).collect();
    convolve_renormalized(values, &kernel)
}

fn convolve_renormalized(values: &[f64], kernel: &[f64]) -> Vec<f64> {
    let half = kernel.len() / 2;
    let n = values.len();
    (0..n)
        .map(|i| {
            let mut acc = 0.0;
            let mut weight = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let pos = i as isize + k as isize - half as isize;
                if pos < 0 || pos as usize >= n {
                    continue;
                }
                acc += w * values[pos as usize];
                weight += w;
            }
            if weight > 0.0 {
                acc / weight
            } else {
                values[i]
            }
        })
        .collect()
}

/// Mean of the last `window` values up to and including each index.
fn trailing_mean(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        let count = (i + 1).min(window);
        out.push(sum / count as f64);
    }
    out
}

fn normalize_unit(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max > min {
        values.iter().map(|v| (v - min) / (max - min)).collect()
    } else {
        values.iter().map(|v| v.clamp(0.0, 1.0)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const HOP: f64 = 512.0 / 44100.0;

    fn steady(freq: f32, rms: f32, n: usize) -> Vec<FrameMeasurement> {
        vec![FrameMeasurement { frequency: freq, voiced: true, rms }; n]
    }

    fn unsmoothed() -> DeviationParams {
        DeviationParams {
            pitch_smoothing: 0,
            amplitude_smoothing: 0,
            ..DeviationParams::default()
        }
    }

    #[test]
    fn sequences_are_aligned_with_fixed_hop() {
        let frames = steady(440.0, 0.3, 50);
        let dev = compute_deviations(&frames, HOP, &DeviationParams::default()).unwrap();
        let series = &dev.series;
        assert!(series.is_aligned());
        assert_eq!(series.len(), 50);
        for pair in series.times.windows(2) {
            assert_relative_eq!(pair[1] - pair[0], HOP, epsilon = 1e-12);
        }
    }

    #[test]
    fn steady_pitch_has_zero_deviation() {
        let dev = compute_deviations(&steady(440.0, 0.3, 20), HOP, &unsmoothed()).unwrap();
        assert_relative_eq!(dev.baseline_hz, 440.0, epsilon = 1e-3);
        assert!(dev.series.pitch_deviation.iter().all(|c| c.abs() < 1e-6));
    }

    #[test]
    fn octave_above_reference_is_1200_cents() {
        let params = DeviationParams {
            baseline: BaselineMode::Reference(220.0),
            ..unsmoothed()
        };
        let dev = compute_deviations(&steady(440.0, 0.3, 5), HOP, &params).unwrap();
        for c in &dev.series.pitch_deviation {
            assert_relative_eq!(*c, 1200.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn unvoiced_frames_emit_zero_and_keep_their_slot() {
        let mut frames = steady(440.0, 0.3, 6);
        frames[0].frequency = 466.16;
        frames[2] = FrameMeasurement { frequency: 0.0, voiced: false, rms: 0.0 };
        let dev = compute_deviations(&frames, HOP, &unsmoothed()).unwrap();
        assert_eq!(dev.series.len(), 6);
        assert!(!dev.series.voiced[2]);
        assert_eq!(dev.series.pitch_deviation[2], 0.0);
        assert!((dev.series.pitch_deviation[0] - 100.0).abs() < 0.1);
    }

    #[test]
    fn too_few_voiced_frames_is_an_error() {
        let mut frames = vec![FrameMeasurement::default(); 30];
        let err = compute_deviations(&frames, HOP, &DeviationParams::default()).unwrap_err();
        assert_eq!(err, AnalysisError::InsufficientVoicing { voiced: 0, total: 30 });

        frames[4] = FrameMeasurement { frequency: 300.0, voiced: true, rms: 0.1 };
        let err = compute_deviations(&frames, HOP, &DeviationParams::default()).unwrap_err();
        assert_eq!(err.kind(), "InsufficientVoicingError");
    }

    #[test]
    fn silence_does_not_produce_nan() {
        let dev = compute_deviations(&steady(440.0, 0.0, 40), HOP, &DeviationParams::default())
            .unwrap();
        assert!(dev.series.amplitude_deviation.iter().all(|d| d.is_finite()));
        assert!(dev.series.amplitude.iter().all(|a| (0.0..=1.0).contains(a)));
    }

    #[test]
    fn amplitude_rise_reads_as_positive_deviation() {
        let mut frames = steady(440.0, 0.1, 200);
        for f in &mut frames[100..] {
            f.rms = 0.2;
        }
        let dev = compute_deviations(&frames, HOP, &unsmoothed()).unwrap();
        let amp = &dev.series.amplitude_deviation;
        assert!(amp[50].abs() < 1e-9);
        assert!(amp[100] > 50.0, "step should read high against the trailing mean");
        assert_relative_eq!(dev.series.amplitude[0], 0.0);
        assert_relative_eq!(dev.series.amplitude[150], 1.0);
    }

    #[test]
    fn rolling_baseline_follows_glide() {
        // Two-octave glide: a global median would report large offsets at the ends.
        let n = 400;
        let frames: Vec<FrameMeasurement> = (0..n)
            .map(|i| FrameMeasurement {
                frequency: 220.0 * 2f32.powf(2.0 * i as f32 / n as f32),
                voiced: true,
                rms: 0.2,
            })
            .collect();
        let rolling = DeviationParams {
            baseline: BaselineMode::Rolling { seconds: 0.5 },
            ..unsmoothed()
        };
        let dev = compute_deviations(&frames, HOP, &rolling).unwrap();
        assert!(dev.series.pitch_deviation[200].abs() < 5.0);

        let global = compute_deviations(&frames, HOP, &unsmoothed()).unwrap();
        assert!(global.series.pitch_deviation[0] < -1000.0);
    }

    #[test]
    fn smoothing_keeps_run_edges_level() {
        let values = vec![0.0, 30.0, 30.0, 30.0, 30.0, 0.0];
        let voiced = vec![false, true, true, true, true, false];
        let out = smooth_voiced_runs(&values, &voiced, 11);
        for v in &out[1..5] {
            assert_relative_eq!(*v, 30.0, epsilon = 1e-9);
        }
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn bad_reference_is_rejected() {
        let params = DeviationParams {
            baseline: BaselineMode::Reference(0.0),
            ..DeviationParams::default()
        };
        let err = compute_deviations(&steady(440.0, 0.3, 5), HOP, &params).unwrap_err();
        assert_eq!(err.kind(), "InvalidRangeError");
    }
}
