use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::correlation::voiced_correlation;
use super::deviation::{compute_deviations, DeviationParams};
use super::extrema::{detect_extrema_with, ExtremaParams, Spacing};
use super::model::{AnalysisResult, ExtremaSet, FrameMeasurement, FrameSeries};
use crate::audio::decode::SampleBuffer;
use crate::audio::frames;
use crate::audio::pitch::PitchExtractor;
use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisParams {
    pub deviation: DeviationParams,
    pub min_magnitude: f64,
    /// Resolved against the frame count once it is known.
    pub min_distance: Spacing,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            deviation: DeviationParams::default(),
            min_magnitude: super::extrema::DEFAULT_MIN_MAGNITUDE,
            min_distance: Spacing::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisState {
    Idle,
    Extracting,
    Deriving,
    Detecting,
    Assembled(Arc<AnalysisResult>),
    Failed(AnalysisError),
}

impl AnalysisState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisState::Assembled(_) | AnalysisState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnalysisState::Idle => "idle",
            AnalysisState::Extracting => "extracting",
            AnalysisState::Deriving => "deriving",
            AnalysisState::Detecting => "detecting",
            AnalysisState::Assembled(_) => "assembled",
            AnalysisState::Failed(_) => "failed",
        }
    }
}

/// Tells a run whether a newer run has replaced it.
#[derive(Debug, Clone)]
pub struct CancelToken {
    latest: Arc<AtomicU64>,
    run: u64,
}

impl CancelToken {
    pub fn new(latest: Arc<AtomicU64>, run: u64) -> Self {
        Self { latest, run }
    }

    /// A token that is never superseded.
    pub fn detached() -> Self {
        Self::new(Arc::new(AtomicU64::new(0)), 0)
    }

    pub fn is_cancelled(&self) -> bool {
        self.latest.load(Ordering::Acquire) != self.run
    }
}

/// One-shot analysis of a single buffer:
/// `Idle -> Extracting -> Deriving -> Detecting -> Assembled`, or `Failed`.
pub struct Pipeline<'a> {
    extractor: &'a dyn PitchExtractor,
    params: AnalysisParams,
    state: AnalysisState,
}

impl<'a> Pipeline<'a> {
    pub fn new(extractor: &'a dyn PitchExtractor, params: AnalysisParams) -> Self {
        Self {
            extractor,
            params,
            state: AnalysisState::Idle,
        }
    }

    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    pub fn run(&mut self, buffer: SampleBuffer, cancel: &CancelToken) -> Result<Arc<AnalysisResult>> {
        if self.state.is_terminal() {
            return Err(AnalysisError::InvalidRange(format!(
                "pipeline already {}; start a fresh run",
                self.state.name()
            )));
        }
        match self.run_stages(buffer, cancel) {
            Ok(result) => {
                self.state = AnalysisState::Assembled(Arc::clone(&result));
                Ok(result)
            }
            Err(err) => {
                if err != AnalysisError::Cancelled {
                    log::warn!("Analysis failed while {}: {}", self.state.name(), err);
                }
                self.state = AnalysisState::Failed(err.clone());
                Err(err)
            }
        }
    }

    fn enter(&mut self, next: AnalysisState, cancel: &CancelToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        self.state = next;
        Ok(())
    }

    fn run_stages(&mut self, buffer: SampleBuffer, cancel: &CancelToken) -> Result<Arc<AnalysisResult>> {
        self.enter(AnalysisState::Extracting, cancel)?;
        log::info!("Pass 1: Pitch extraction ({:.1}s of audio)...", buffer.duration());
        let (measurements, hop_duration) = self.extract(&buffer)?;

        self.enter(AnalysisState::Deriving, cancel)?;
        log::info!("Pass 2: Deviations ({} frames)...", measurements.len());
        let deviations = compute_deviations(&measurements, hop_duration, &self.params.deviation)?;

        self.enter(AnalysisState::Detecting, cancel)?;
        let series = deviations.series;
        let extrema_params = ExtremaParams {
            min_magnitude: self.params.min_magnitude,
            min_distance: self.params.min_distance.resolve(series.len()),
        };
        log::info!(
            "Pass 3: Extrema (min magnitude {:.1} cents, spacing {} frames)...",
            extrema_params.min_magnitude,
            extrema_params.min_distance
        );
        let extrema = detect_extrema_with(&series.pitch_deviation, &series.voiced, &extrema_params);
        let correlation = voiced_correlation(&series, 0..series.len())?;

        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let result = assemble(series, extrema, correlation, buffer.sample_rate, deviations.baseline_hz);
        log::info!(
            "Analysis: {} oscillations, {:.2} Hz, {:.1} cents extent, r={:+.2}, baseline {:.1} Hz",
            result.oscillations,
            result.rate_hz,
            result.extent_cents,
            result.correlation,
            result.baseline_hz
        );
        Ok(Arc::new(result))
    }

    fn extract(&self, buffer: &SampleBuffer) -> Result<(Vec<FrameMeasurement>, f64)> {
        if buffer.is_empty() {
            return Err(AnalysisError::Decode("sample buffer is empty".into()));
        }
        if buffer.sample_rate == 0 {
            return Err(AnalysisError::Decode("sample rate is zero".into()));
        }

        let track = self.extractor.extract(buffer).map_err(|err| match err {
            AnalysisError::Decode(_) => err,
            other => AnalysisError::Decode(format!("pitch extraction failed: {other}")),
        })?;
        if track.frames.is_empty() || track.hop_size == 0 {
            return Err(AnalysisError::Decode("pitch extractor produced no frames".into()));
        }

        let mut rms = frames::frame_rms(&buffer.samples, track.frame_length.max(1), track.hop_size);
        if rms.len() != track.frames.len() {
            log::debug!(
                "Resampling RMS envelope from {} to {} frames",
                rms.len(),
                track.frames.len()
            );
            rms = frames::resample_linear(&rms, track.frames.len());
        }

        let measurements = track
            .frames
            .iter()
            .zip(rms)
            .map(|(est, rms)| FrameMeasurement {
                frequency: est.frequency,
                voiced: est.voiced,
                rms,
            })
            .collect();
        let hop_duration = track.hop_size as f64 / buffer.sample_rate as f64;
        Ok((measurements, hop_duration))
    }
}

fn assemble(
    series: FrameSeries,
    extrema: ExtremaSet,
    correlation: f64,
    sample_rate: u32,
    baseline_hz: f64,
) -> AnalysisResult {
    let duration = series.times.last().copied().unwrap_or(0.0);
    let voiced_seconds = series.voiced_count() as f64 * series.hop_duration();
    let oscillations = extrema.peaks.len();
    let rate_hz = if voiced_seconds > 0.0 {
        oscillations as f64 / voiced_seconds
    } else {
        0.0
    };
    let extreme_count = extrema.peaks.len() + extrema.troughs.len();
    let extent_cents = if extreme_count > 0 {
        extrema
            .peaks
            .iter()
            .chain(&extrema.troughs)
            .map(|&i| series.pitch_deviation[i].abs())
            .sum::<f64>()
            / extreme_count as f64
    } else {
        0.0
    };

    AnalysisResult {
        series,
        extrema,
        oscillations,
        duration,
        sample_rate,
        correlation,
        rate_hz,
        extent_cents,
        baseline_hz,
    }
}
