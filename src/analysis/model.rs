use serde::Serialize;

/// Deviation calculator input: one entry per analysis frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameMeasurement {
    pub frequency: f32,
    pub voiced: bool,
    pub rms: f32,
}

/// Equal-length parallel sequences, one entry per analysis frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSeries {
    /// Seconds, `i * hop_duration`.
    pub times: Vec<f64>,
    /// Cents relative to the pitch baseline; 0 where unvoiced.
    pub pitch_deviation: Vec<f64>,
    /// Percent relative to the rolling RMS baseline.
    pub amplitude_deviation: Vec<f64>,
    /// Smoothed RMS normalized to 0..1 over the whole clip.
    pub amplitude: Vec<f64>,
    pub voiced: Vec<bool>,
}

impl FrameSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Every parallel sequence has the same length.
    pub fn is_aligned(&self) -> bool {
        let n = self.times.len();
        self.pitch_deviation.len() == n
            && self.amplitude_deviation.len() == n
            && self.amplitude.len() == n
            && self.voiced.len() == n
    }

    pub fn voiced_count(&self) -> usize {
        self.voiced.iter().filter(|&&v| v).count()
    }

    pub fn hop_duration(&self) -> f64 {
        if self.times.len() < 2 {
            return 0.0;
        }
        self.times[1] - self.times[0]
    }
}

/// Oscillation extrema as frame indices, each list strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtremaSet {
    pub peaks: Vec<usize>,
    pub troughs: Vec<usize>,
}

impl ExtremaSet {
    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty() && self.troughs.is_empty()
    }

    /// Peaks and troughs within the inclusive index range.
    pub fn within(&self, start: usize, end: usize) -> (&[usize], &[usize]) {
        (slice_between(&self.peaks, start, end), slice_between(&self.troughs, start, end))
    }
}

fn slice_between(sorted: &[usize], start: usize, end: usize) -> &[usize] {
    let lo = sorted.partition_point(|&i| i < start);
    let hi = sorted.partition_point(|&i| i <= end);
    &sorted[lo..hi.max(lo)]
}

/// The complete, immutable outcome of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(flatten)]
    pub series: FrameSeries,
    #[serde(flatten)]
    pub extrema: ExtremaSet,
    pub oscillations: usize,
    /// Time of the last frame.
    pub duration: f64,
    pub sample_rate: u32,
    /// Full-clip pitch/amplitude deviation correlation over voiced frames.
    pub correlation: f64,
    /// Oscillations per second of voiced time.
    pub rate_hz: f64,
    /// Mean |cents| at the detected extrema.
    pub extent_cents: f64,
    pub baseline_hz: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_selects_inclusive_range() {
        let set = ExtremaSet {
            peaks: vec![3, 10, 17, 24],
            troughs: vec![6, 13, 20],
        };
        let (peaks, troughs) = set.within(10, 20);
        assert_eq!(peaks, &[10, 17]);
        assert_eq!(troughs, &[13, 20]);

        let (peaks, troughs) = set.within(25, 40);
        assert!(peaks.is_empty() && troughs.is_empty());
    }

    #[test]
    fn serializes_with_wire_names() {
        let result = AnalysisResult {
            series: FrameSeries {
                times: vec![0.0, 0.5],
                pitch_deviation: vec![0.0, 12.0],
                amplitude_deviation: vec![1.0, -1.0],
                amplitude: vec![0.0, 1.0],
                voiced: vec![false, true],
            },
            extrema: ExtremaSet::default(),
            oscillations: 0,
            duration: 0.5,
            sample_rate: 44100,
            correlation: 0.0,
            rate_hz: 0.0,
            extent_cents: 0.0,
            baseline_hz: 440.0,
        };
        let value = serde_json::to_value(&result).unwrap();
        for key in [
            "times",
            "pitchDeviation",
            "amplitudeDeviation",
            "amplitude",
            "voiced",
            "peaks",
            "troughs",
            "oscillations",
            "duration",
            "sampleRate",
            "correlation",
            "rateHz",
            "extentCents",
            "baselineHz",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["sampleRate"], 44100);
    }
}
