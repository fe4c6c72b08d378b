//! Peak/trough detection on the pitch-deviation contour.
//!
//! An extremum is a strict local maximum (or minimum) against both immediate
//! neighbors whose magnitude reaches the noise threshold. Plateaus never
//! qualify and the first and last frames are never classified.

use super::model::ExtremaSet;

/// Below typical vibrato width; rejects tracker jitter and quantization noise.
pub const DEFAULT_MIN_MAGNITUDE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtremaParams {
    pub min_magnitude: f64,
    /// Minimum spacing in frames between two extrema of the same kind.
    /// Values <= 1 disable the constraint.
    pub min_distance: usize,
}

impl Default for ExtremaParams {
    fn default() -> Self {
        Self {
            min_magnitude: DEFAULT_MIN_MAGNITUDE,
            min_distance: 1,
        }
    }
}

impl ExtremaParams {
    /// `max(3, n / 200)` frames. Grows with clip length, so on long clips it
    /// exceeds one vibrato period and merges real extrema.
    pub fn auto_distance(frame_count: usize) -> usize {
        (frame_count / 200).max(3)
    }
}

/// How the spacing between extrema of one kind is chosen for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spacing {
    /// A fixed number of frames; `1` reports every strict extremum.
    Frames(usize),
    /// [`ExtremaParams::auto_distance`] of the series length. Opt-in only.
    Auto,
}

impl Default for Spacing {
    fn default() -> Self {
        Spacing::Frames(1)
    }
}

impl Spacing {
    pub fn resolve(self, frame_count: usize) -> usize {
        match self {
            Spacing::Frames(frames) => frames,
            Spacing::Auto => ExtremaParams::auto_distance(frame_count),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Kind {
    Peak,
    Trough,
}

fn classify(values: &[f64], i: usize, min_magnitude: f64) -> Option<Kind> {
    let (prev, cur, next) = (values[i - 1], values[i], values[i + 1]);
    if cur.abs() < min_magnitude {
        return None;
    }
    if cur > prev && cur > next {
        Some(Kind::Peak)
    } else if cur < prev && cur < next {
        Some(Kind::Trough)
    } else {
        None
    }
}

/// Single left-to-right scan over the interior indices.
pub fn detect_extrema(pitch_deviation: &[f64], min_magnitude: f64) -> ExtremaSet {
    let mut set = ExtremaSet::default();
    if pitch_deviation.len() < 3 {
        return set;
    }
    for i in 1..pitch_deviation.len() - 1 {
        match classify(pitch_deviation, i, min_magnitude) {
            Some(Kind::Peak) => set.peaks.push(i),
            Some(Kind::Trough) => set.troughs.push(i),
            None => {}
        }
    }
    set
}

/// Like [`detect_extrema`], but an index only counts when it and both of its
/// neighbors are voiced, and extrema of the same kind closer than
/// `min_distance` frames collapse onto the larger magnitude.
pub fn detect_extrema_with(pitch_deviation: &[f64], voiced: &[bool], params: &ExtremaParams) -> ExtremaSet {
    let mut set = ExtremaSet::default();
    let n = pitch_deviation.len().min(voiced.len());
    if n < 3 {
        return set;
    }
    for i in 1..n - 1 {
        if !(voiced[i - 1] && voiced[i] && voiced[i + 1]) {
            continue;
        }
        match classify(pitch_deviation, i, params.min_magnitude) {
            Some(Kind::Peak) => push_spaced(&mut set.peaks, i, pitch_deviation, params.min_distance),
            Some(Kind::Trough) => {
                push_spaced(&mut set.troughs, i, pitch_deviation, params.min_distance)
            }
            None => {}
        }
    }
    set
}

fn push_spaced(list: &mut Vec<usize>, index: usize, values: &[f64], min_distance: usize) {
    if let Some(&last) = list.last() {
        if index - last < min_distance {
            if values[index].abs() > values[last].abs() {
                if let Some(slot) = list.last_mut() {
                    *slot = index;
                }
            }
            return;
        }
    }
    list.push(index);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vibrato(rate_hz: f64, depth: f64, seconds: f64, frame_rate: f64) -> Vec<f64> {
        let n = (seconds * frame_rate) as usize;
        (0..n)
            .map(|i| depth * (2.0 * std::f64::consts::PI * rate_hz * i as f64 / frame_rate).sin())
            .collect()
    }

    fn check_invariants(set: &ExtremaSet, n: usize) {
        for list in [&set.peaks, &set.troughs] {
            assert!(list.windows(2).all(|w| w[0] < w[1]), "not strictly increasing");
            assert!(list.iter().all(|&i| i > 0 && i < n - 1), "boundary index");
        }
        assert!(set.peaks.iter().all(|p| !set.troughs.contains(p)));
    }

    #[test]
    fn constant_input_has_no_extrema() {
        let set = detect_extrema(&[25.0; 64], 10.0);
        assert!(set.is_empty());
    }

    #[test]
    fn plateaus_are_not_extrema() {
        let values = [0.0, 20.0, 20.0, 0.0, -20.0, -20.0, 0.0];
        assert!(detect_extrema(&values, 10.0).is_empty());
    }

    #[test]
    fn boundaries_are_never_classified() {
        let values = [50.0, 0.0, 30.0, 0.0, -50.0];
        let set = detect_extrema(&values, 10.0);
        assert_eq!(set.peaks, vec![2]);
        assert!(set.troughs.is_empty());
    }

    #[test]
    fn small_wiggles_are_rejected() {
        let set = detect_extrema(&vibrato(5.5, 4.0, 2.0, 86.13), DEFAULT_MIN_MAGNITUDE);
        assert!(set.is_empty());
    }

    #[test]
    fn clean_vibrato_peak_count() {
        let frame_rate = 44100.0 / 512.0;
        let values = vibrato(5.5, 30.0, 10.0, frame_rate);
        let set = detect_extrema(&values, DEFAULT_MIN_MAGNITUDE);
        check_invariants(&set, values.len());
        let expected = (10.0f64 * 5.5).round() as i64;
        assert!((set.peaks.len() as i64 - expected).abs() <= 1, "got {} peaks", set.peaks.len());
        assert!((set.troughs.len() as i64 - expected).abs() <= 1);
    }

    #[test]
    fn unvoiced_neighbors_block_detection() {
        let values = [0.0, 0.0, 40.0, 0.0, 0.0];
        let voiced = [true, false, true, true, true];
        let set = detect_extrema_with(&values, &voiced, &ExtremaParams::default());
        assert!(set.is_empty());
    }

    #[test]
    fn min_distance_keeps_the_larger_extremum() {
        let values = [0.0, 20.0, 15.0, 35.0, 0.0, -5.0, 0.0];
        let voiced = [true; 7];
        let plain = detect_extrema_with(&values, &voiced, &ExtremaParams::default());
        assert_eq!(plain.peaks, vec![1, 3]);

        let spaced = detect_extrema_with(
            &values,
            &voiced,
            &ExtremaParams { min_magnitude: 10.0, min_distance: 3 },
        );
        assert_eq!(spaced.peaks, vec![3]);
        check_invariants(&spaced, values.len());
    }

    #[test]
    fn auto_distance_has_a_floor() {
        assert_eq!(ExtremaParams::auto_distance(100), 3);
        assert_eq!(ExtremaParams::auto_distance(2000), 10);
        assert_eq!(Spacing::Auto.resolve(2000), 10);
        assert_eq!(Spacing::default().resolve(2000), 1);
    }
}
