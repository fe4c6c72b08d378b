//! Fundamental-frequency tracking.
//!
//! The analysis pipeline only depends on [`PitchExtractor`]: given a mono
//! buffer, return one [`PitchEstimate`] per centered frame. [`YinExtractor`]
//! is the default implementation (de Cheveigné & Kawahara, 2002) with the
//! difference function computed through an FFT cross-correlation:
//!
//!   d(τ) = e(0) + e(τ) - 2·r(τ),   r = IFFT(conj(FFT(head)) · FFT(frame))

use std::sync::Arc;

use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::decode::SampleBuffer;
use super::frames::{self, FRAME_LENGTH, HOP_SIZE};
use crate::error::{AnalysisError, Result};

/// C2 and C6, the singing range the tracker searches.
pub const DEFAULT_FMIN: f32 = 65.41;
pub const DEFAULT_FMAX: f32 = 1046.5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PitchEstimate {
    /// Hz; meaningful only when `voiced`.
    pub frequency: f32,
    pub voiced: bool,
    /// 1 - aperiodicity, 0..1
    pub confidence: f32,
}

impl PitchEstimate {
    pub fn voiced(frequency: f32, confidence: f32) -> Self {
        Self { frequency, voiced: true, confidence }
    }

    pub fn unvoiced() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PitchTrack {
    pub hop_size: usize,
    pub frame_length: usize,
    pub frames: Vec<PitchEstimate>,
}

impl PitchTrack {
    pub fn voiced_count(&self) -> usize {
        self.frames.iter().filter(|f| f.voiced).count()
    }
}

/// Capability: per-frame F0 with a voicing decision.
pub trait PitchExtractor: Send + Sync {
    fn extract(&self, buffer: &SampleBuffer) -> Result<PitchTrack>;
}

#[derive(Debug, Clone)]
pub struct YinConfig {
    pub fmin: f32,
    pub fmax: f32,
    /// Absolute threshold on the cumulative mean normalized difference.
    pub threshold: f32,
    pub frame_length: usize,
    pub hop_size: usize,
    /// Frames quieter than this RMS are unvoiced without running YIN.
    pub silence_rms: f32,
}

impl Default for YinConfig {
    fn default() -> Self {
        Self {
            fmin: DEFAULT_FMIN,
            fmax: DEFAULT_FMAX,
            threshold: 0.15,
            frame_length: FRAME_LENGTH,
            hop_size: HOP_SIZE,
            silence_rms: 1e-3,
        }
    }
}

pub struct YinExtractor {
    config: YinConfig,
}

impl YinExtractor {
    pub fn new(config: YinConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &YinConfig {
        &self.config
    }
}

impl Default for YinExtractor {
    fn default() -> Self {
        Self::new(YinConfig::default())
    }
}

impl PitchExtractor for YinExtractor {
    fn extract(&self, buffer: &SampleBuffer) -> Result<PitchTrack> {
        let cfg = &self.config;
        if buffer.sample_rate == 0 {
            return Err(AnalysisError::Decode("sample rate is zero".into()));
        }
        if cfg.frame_length < 4 || cfg.hop_size == 0 || cfg.fmin <= 0.0 || cfg.fmax <= cfg.fmin {
            return Err(AnalysisError::InvalidRange(format!(
                "unusable pitch tracker settings: {:?}",
                cfg
            )));
        }

        let sr = buffer.sample_rate as f32;
        let half = cfg.frame_length / 2;
        let max_tau = ((sr / cfg.fmin) as usize).min(half);
        let min_tau = ((sr / cfg.fmax) as usize).max(2);
        if min_tau >= max_tau {
            return Err(AnalysisError::InvalidRange(format!(
                "frame of {} samples cannot hold a {:.1} Hz period at {} Hz",
                cfg.frame_length, cfg.fmin, buffer.sample_rate
            )));
        }

        let fft_size = cfg.frame_length.next_power_of_two();
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        let n = frames::frame_count(buffer.samples.len(), cfg.hop_size);
        let samples = &buffer.samples;

        let estimates: Vec<PitchEstimate> = (0..n)
            .into_par_iter()
            .map_init(
                || YinScratch::new(cfg.frame_length, fft_size, max_tau),
                |scratch, idx| {
                    frames::fill_frame(samples, idx, cfg.hop_size, &mut scratch.frame);
                    if frames::rms(&scratch.frame) < cfg.silence_rms {
                        return PitchEstimate::unvoiced();
                    }
                    scratch.estimate(&forward, &inverse, half, min_tau, max_tau, cfg.threshold, sr)
                },
            )
            .collect();

        let track = PitchTrack {
            hop_size: cfg.hop_size,
            frame_length: cfg.frame_length,
            frames: estimates,
        };
        log::debug!(
            "YIN: {} frames, {} voiced (tau {}..{})",
            track.frames.len(),
            track.voiced_count(),
            min_tau,
            max_tau
        );
        Ok(track)
    }
}

/// Per-thread working buffers.
struct YinScratch {
    frame: Vec<f32>,
    head: Vec<Complex<f32>>,
    full: Vec<Complex<f32>>,
    energy: Vec<f64>,
    cmnd: Vec<f32>,
}

impl YinScratch {
    fn new(frame_length: usize, fft_size: usize, max_tau: usize) -> Self {
        Self {
            frame: vec![0.0; frame_length],
            head: vec![Complex::new(0.0, 0.0); fft_size],
            full: vec![Complex::new(0.0, 0.0); fft_size],
            energy: vec![0.0; frame_length + 1],
            cmnd: vec![1.0; max_tau + 1],
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn estimate(
        &mut self,
        forward: &Arc<dyn Fft<f32>>,
        inverse: &Arc<dyn Fft<f32>>,
        window: usize,
        min_tau: usize,
        max_tau: usize,
        threshold: f32,
        sample_rate: f32,
    ) -> PitchEstimate {
        let fft_size = self.head.len();

        for (i, slot) in self.head.iter_mut().enumerate() {
            let v = if i < window { self.frame[i] } else { 0.0 };
            *slot = Complex::new(v, 0.0);
        }
        for (i, slot) in self.full.iter_mut().enumerate() {
            let v = self.frame.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(v, 0.0);
        }
        forward.process(&mut self.head);
        forward.process(&mut self.full);
        for (h, f) in self.head.iter_mut().zip(self.full.iter()) {
            *h = h.conj() * f;
        }
        inverse.process(&mut self.head);
        let norm = 1.0 / fft_size as f32;

        self.energy[0] = 0.0;
        for (i, &s) in self.frame.iter().enumerate() {
            self.energy[i + 1] = self.energy[i] + (s as f64) * (s as f64);
        }
        let e0 = self.energy[window];

        self.cmnd[0] = 1.0;
        let mut running_sum = 0.0f64;
        for tau in 1..=max_tau {
            let e_tau = self.energy[tau + window] - self.energy[tau];
            let r = (self.head[tau].re * norm) as f64;
            let d = (e0 + e_tau - 2.0 * r).max(0.0);
            running_sum += d;
            self.cmnd[tau] = if running_sum > 1e-12 {
                (d * tau as f64 / running_sum) as f32
            } else {
                1.0
            };
        }

        // First dip below threshold, walked down to its local minimum.
        let mut tau = min_tau;
        while tau < max_tau {
            if self.cmnd[tau] < threshold {
                while tau + 1 < max_tau && self.cmnd[tau + 1] < self.cmnd[tau] {
                    tau += 1;
                }
                let period = parabolic_vertex(&self.cmnd, tau);
                if period <= 0.0 {
                    return PitchEstimate::unvoiced();
                }
                let confidence = (1.0 - self.cmnd[tau]).clamp(0.0, 1.0);
                return PitchEstimate::voiced(sample_rate / period, confidence);
            }
            tau += 1;
        }

        PitchEstimate::unvoiced()
    }
}

fn parabolic_vertex(values: &[f32], tau: usize) -> f32 {
    if tau < 1 || tau + 1 >= values.len() {
        return tau as f32;
    }
    let s0 = values[tau - 1];
    let s1 = values[tau];
    let s2 = values[tau + 1];
    let denominator = 2.0 * (2.0 * s1 - s2 - s0);
    if denominator.abs() > 1e-10 {
        tau as f32 + (s2 - s0) / denominator
    } else {
        tau as f32
    }
}
