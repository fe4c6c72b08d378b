use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analysis::deviation::{BaselineMode, DeviationParams};
use crate::analysis::extrema::Spacing;
use crate::analysis::AnalysisParams;
use crate::audio::pitch::YinConfig;
use crate::playback::DEFAULT_WINDOW;

pub const CONFIG_FILE: &str = "vibrascope.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_fmin")]
    pub fmin: f32,
    #[serde(default = "default_fmax")]
    pub fmax: f32,
    #[serde(default = "default_yin_threshold")]
    pub yin_threshold: f32,
    /// `median`, `rolling`, or a reference frequency in Hz.
    #[serde(default = "default_baseline")]
    pub baseline: String,
    #[serde(default = "default_rolling_seconds")]
    pub rolling_seconds: f64,
    #[serde(default = "default_pitch_smoothing")]
    pub pitch_smoothing: usize,
    #[serde(default = "default_amplitude_smoothing")]
    pub amplitude_smoothing: usize,
    #[serde(default = "default_amplitude_baseline_seconds")]
    pub amplitude_baseline_seconds: f64,
    #[serde(default = "default_min_magnitude")]
    pub min_magnitude: f64,
    /// Minimum frames between extrema of one kind; `1` when absent.
    #[serde(default)]
    pub min_distance: Option<usize>,
    /// Use `max(3, n / 200)` frames instead of `min_distance`.
    #[serde(default)]
    pub auto_min_distance: bool,
}

#[derive(Debug, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_window")]
    pub window: f64,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    #[serde(default)]
    pub font: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fmin: default_fmin(),
            fmax: default_fmax(),
            yin_threshold: default_yin_threshold(),
            baseline: default_baseline(),
            rolling_seconds: default_rolling_seconds(),
            pitch_smoothing: default_pitch_smoothing(),
            amplitude_smoothing: default_amplitude_smoothing(),
            amplitude_baseline_seconds: default_amplitude_baseline_seconds(),
            min_magnitude: default_min_magnitude(),
            min_distance: None,
            auto_min_distance: false,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            window: default_window(),
            crf: default_crf(),
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
            font: None,
        }
    }
}

fn default_fmin() -> f32 { 65.41 }
fn default_fmax() -> f32 { 1046.5 }
fn default_yin_threshold() -> f32 { 0.15 }
fn default_baseline() -> String { "median".into() }
fn default_rolling_seconds() -> f64 { 2.0 }
fn default_pitch_smoothing() -> usize { 11 }
fn default_amplitude_smoothing() -> usize { 21 }
fn default_amplitude_baseline_seconds() -> f64 { 1.0 }
fn default_min_magnitude() -> f64 { crate::analysis::extrema::DEFAULT_MIN_MAGNITUDE }
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_fps() -> u32 { 30 }
fn default_window() -> f64 { DEFAULT_WINDOW }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }

impl AnalysisConfig {
    pub fn yin(&self) -> YinConfig {
        YinConfig {
            fmin: self.fmin,
            fmax: self.fmax,
            threshold: self.yin_threshold,
            ..YinConfig::default()
        }
    }

    pub fn params(&self) -> Result<AnalysisParams> {
        Ok(AnalysisParams {
            deviation: DeviationParams {
                baseline: parse_baseline(&self.baseline, self.rolling_seconds)?,
                pitch_smoothing: self.pitch_smoothing,
                amplitude_smoothing: self.amplitude_smoothing,
                amplitude_baseline_seconds: self.amplitude_baseline_seconds,
            },
            min_magnitude: self.min_magnitude,
            min_distance: if self.auto_min_distance {
                Spacing::Auto
            } else {
                Spacing::Frames(self.min_distance.unwrap_or(1))
            },
        })
    }
}

/// Parses `median`, `rolling`, or a positive reference frequency in Hz.
pub fn parse_baseline(value: &str, rolling_seconds: f64) -> Result<BaselineMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "median" | "global" => Ok(BaselineMode::GlobalMedian),
        "rolling" => Ok(BaselineMode::Rolling {
            seconds: rolling_seconds,
        }),
        other => {
            let hz: f64 = other
                .trim_end_matches("hz")
                .trim()
                .parse()
                .with_context(|| format!("unknown baseline {value:?}; expected median, rolling or a frequency"))?;
            anyhow::ensure!(hz.is_finite() && hz > 0.0, "reference frequency must be positive, got {hz}");
            Ok(BaselineMode::Reference(hz))
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Explicit path, then `./vibrascope.toml`, then the per-user config files.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("vibrascope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("vibrascope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
