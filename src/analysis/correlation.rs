//! Pearson correlation between pitch and amplitude deviation.

use std::ops::Range;

use super::model::FrameSeries;
use crate::error::{AnalysisError, Result};

/// Pearson's r over two equal-length, non-empty slices, clamped to [-1, 1].
/// Returns 0 when either slice has zero variance.
pub fn correlation(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.len() != y.len() {
        return Err(AnalysisError::InvalidRange(format!(
            "slices differ in length: {} vs {}",
            x.len(),
            y.len()
        )));
    }
    if x.is_empty() {
        return Err(AnalysisError::InvalidRange("empty slices".into()));
    }
    Ok(pearson(x.iter().copied().zip(y.iter().copied())))
}

fn pearson(pairs: impl Iterator<Item = (f64, f64)> + Clone) -> f64 {
    let (mut n, mut sum_x, mut sum_y) = (0usize, 0.0, 0.0);
    for (x, y) in pairs.clone() {
        n += 1;
        sum_x += x;
        sum_y += y;
    }
    if n == 0 {
        return 0.0;
    }
    let mean_x = sum_x / n as f64;
    let mean_y = sum_y / n as f64;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom <= f64::EPSILON * (n as f64) || !denom.is_finite() {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

/// Correlation of pitch and amplitude deviation over the voiced frames in
/// `range`. Fewer than two voiced frames gives 0.
pub fn voiced_correlation(series: &FrameSeries, range: Range<usize>) -> Result<f64> {
    if range.start > range.end || range.end > series.len() {
        return Err(AnalysisError::InvalidRange(format!(
            "frame range {:?} outside 0..{}",
            range,
            series.len()
        )));
    }
    let voiced = &series.voiced[range.clone()];
    if voiced.iter().filter(|&&v| v).count() < 2 {
        return Ok(0.0);
    }
    let pairs = series.pitch_deviation[range.clone()]
        .iter()
        .zip(&series.amplitude_deviation[range])
        .zip(voiced)
        .filter(|(_, &v)| v)
        .map(|((&p, &a), _)| (p, a));
    Ok(pearson(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn self_correlation_is_one() {
        let x: Vec<f64> = (0..50).map(|i| (i as f64 * 0.3).sin() * 20.0).collect();
        assert_relative_eq!(correlation(&x, &x).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn inverted_series_is_minus_one() {
        let x: Vec<f64> = (0..50).map(|i| (i as f64 * 0.3).sin()).collect();
        let y: Vec<f64> = x.iter().map(|v| -3.0 * v + 1.0).collect();
        assert_relative_eq!(correlation(&x, &y).unwrap(), -1.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_variance_gives_zero() {
        let flat = vec![4.0; 20];
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert_eq!(correlation(&flat, &x).unwrap(), 0.0);
        assert_eq!(correlation(&x, &flat).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_or_empty_slices_fail_fast() {
        assert_eq!(correlation(&[1.0, 2.0], &[1.0]).unwrap_err().kind(), "InvalidRangeError");
        assert_eq!(correlation(&[], &[]).unwrap_err().kind(), "InvalidRangeError");
    }

    #[test]
    fn voiced_correlation_ignores_unvoiced_frames() {
        let series = FrameSeries {
            times: (0..6).map(|i| i as f64 * 0.01).collect(),
            pitch_deviation: vec![10.0, 0.0, 20.0, 30.0, 0.0, 40.0],
            amplitude_deviation: vec![1.0, 50.0, 2.0, 3.0, -50.0, 4.0],
            amplitude: vec![0.5; 6],
            voiced: vec![true, false, true, true, false, true],
        };
        assert_relative_eq!(voiced_correlation(&series, 0..6).unwrap(), 1.0, epsilon = 1e-9);
        assert_eq!(voiced_correlation(&series, 0..2).unwrap(), 0.0);
        assert!(voiced_correlation(&series, 2..9).is_err());
    }
}
