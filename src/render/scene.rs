//! Per-tick draw instructions for the three synchronized panels.
//!
//! `render_tick` is a pure function of the loaded result and the playback
//! state. It never mutates the result and never fails as a whole: an
//! unresolvable window skips the tick, and a panel that cannot be laid out
//! reports its own error while the other panels still draw.

use std::ops::Range;

use thiserror::Error;

use crate::analysis::correlation::voiced_correlation;
use crate::analysis::AnalysisResult;
use crate::playback::{PlaybackState, VisibleWindow};

/// sRGB color with straight alpha, components in 0..1.
pub type Rgba = [f32; 4];

pub const PAD_LEFT: f32 = 56.0;
pub const PAD_RIGHT: f32 = 16.0;
pub const PAD_TOP: f32 = 24.0;
pub const PAD_BOTTOM: f32 = 18.0;
pub const LABEL_SIZE: f32 = 12.0;
pub const TITLE_SIZE: f32 = 14.0;

pub const BACKGROUND: Rgba = [0.078, 0.086, 0.110, 1.0];
const GRID: Rgba = [1.0, 1.0, 1.0, 0.08];
const ZERO_LINE: Rgba = [1.0, 1.0, 1.0, 0.25];
const LABEL: Rgba = [0.78, 0.80, 0.85, 1.0];
const PITCH: Rgba = [0.35, 0.72, 1.0, 1.0];
const PITCH_FILL: Rgba = [0.35, 0.72, 1.0, 0.22];
const AMPLITUDE: Rgba = [1.0, 0.66, 0.25, 1.0];
const AMPLITUDE_FILL: Rgba = [1.0, 0.66, 0.25, 0.22];
const PEAK: Rgba = [1.0, 0.33, 0.38, 1.0];
const TROUGH: Rgba = [0.40, 0.95, 0.55, 1.0];
const PLAYHEAD: Rgba = [1.0, 1.0, 1.0, 0.85];

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect { x: f32, y: f32, width: f32, height: f32, color: Rgba },
    Line { from: [f32; 2], to: [f32; 2], width: f32, color: Rgba },
    Polyline { points: Vec<[f32; 2]>, width: f32, color: Rgba },
    /// Area between the curve and the horizontal line at `baseline`.
    FilledCurve { points: Vec<[f32; 2]>, baseline: f32, color: Rgba },
    Marker { center: [f32; 2], radius: f32, color: Rgba },
    Text { position: [f32; 2], text: String, size: f32, color: Rgba },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
    Pitch,
    Amplitude,
    Correlation,
}

impl PanelKind {
    pub const ALL: [PanelKind; 3] = [PanelKind::Pitch, PanelKind::Amplitude, PanelKind::Correlation];
}

/// Where a panel lives inside the output frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelSurface {
    pub kind: PanelKind,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PanelSurface {
    /// Pitch, amplitude and correlation stacked top to bottom.
    pub fn stacked(width: u32, height: u32) -> Vec<PanelSurface> {
        let each = height / 3;
        PanelKind::ALL
            .iter()
            .enumerate()
            .map(|(i, &kind)| {
                let y = each * i as u32;
                let h = if i == 2 { height - y } else { each };
                PanelSurface { kind, x: 0, y, width, height: h }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PanelError {
    #[error("{kind:?} panel is too small to draw ({width}x{height})")]
    Degenerate { kind: PanelKind, width: u32, height: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelFrame {
    pub surface: PanelSurface,
    /// Commands in panel-local pixels.
    pub outcome: Result<Vec<DrawCommand>, PanelError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub window: VisibleWindow,
    /// Pitch/amplitude correlation over the visible slice only.
    pub local_correlation: f64,
    pub panels: Vec<PanelFrame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoResult,
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    Skip(SkipReason),
    Draw(Scene),
}

/// Linear time/value to pixel mapping for one panel. The playhead time maps
/// to the right edge of the content area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    current_time: f64,
    window_size: f64,
}

impl Layout {
    pub fn new(width: u32, height: u32, current_time: f64, window_size: f64) -> Option<Self> {
        let (w, h) = (width as f32, height as f32);
        let layout = Self {
            left: PAD_LEFT,
            right: w - PAD_RIGHT,
            top: PAD_TOP,
            bottom: h - PAD_BOTTOM,
            current_time,
            window_size,
        };
        (layout.right - layout.left > 1.0 && layout.bottom - layout.top > 1.0 && window_size > 0.0)
            .then_some(layout)
    }

    pub fn x(&self, time: f64) -> f32 {
        let width = (self.right - self.left) as f64;
        self.right - ((self.current_time - time) * width / self.window_size) as f32
    }

    /// `value` mapped into `[top, bottom]`, clamped to the content area.
    pub fn y(&self, value: f64, min: f64, max: f64) -> f32 {
        let frac = ((value - min) / (max - min)).clamp(0.0, 1.0) as f32;
        self.bottom - frac * (self.bottom - self.top)
    }

    pub fn seconds_per_pixel(&self) -> f64 {
        self.window_size / (self.right - self.left) as f64
    }
}

struct Axis {
    min: f64,
    max: f64,
    labels: &'static [f64],
    title: &'static str,
}

const PITCH_AXIS: Axis = Axis {
    min: -100.0,
    max: 100.0,
    labels: &[-100.0, -50.0, 0.0, 50.0, 100.0],
    title: "Pitch deviation (cents)",
};

const AMPLITUDE_AXIS: Axis = Axis {
    min: -50.0,
    max: 50.0,
    labels: &[-50.0, -25.0, 0.0, 25.0, 50.0],
    title: "Amplitude deviation (%)",
};

const CORRELATION_AXIS: Axis = Axis {
    min: 0.0,
    max: 1.0,
    labels: &[0.0, 0.5, 1.0],
    title: "Pitch vs amplitude",
};

pub fn render_tick(
    result: Option<&AnalysisResult>,
    playback: &PlaybackState,
    surfaces: &[PanelSurface],
) -> Tick {
    let Some(result) = result else {
        return Tick::Skip(SkipReason::NoResult);
    };
    let series = &result.series;
    let Some(window) = playback.visible_window(&series.times) else {
        log::debug!("No visible frames at t={:.3}s; skipping tick", playback.current_time());
        return Tick::Skip(SkipReason::OutOfRange);
    };

    let slice = window.draw_range();
    let local_correlation = voiced_correlation(series, slice).unwrap_or_else(|err| {
        log::debug!("Local correlation unavailable: {}", err);
        0.0
    });

    let panels = surfaces
        .iter()
        .map(|surface| PanelFrame {
            surface: *surface,
            outcome: draw_panel(result, playback, &window, local_correlation, surface),
        })
        .collect();

    Tick::Draw(Scene {
        window,
        local_correlation,
        panels,
    })
}

fn draw_panel(
    result: &AnalysisResult,
    playback: &PlaybackState,
    window: &VisibleWindow,
    local_correlation: f64,
    surface: &PanelSurface,
) -> Result<Vec<DrawCommand>, PanelError> {
    let layout = Layout::new(
        surface.width,
        surface.height,
        playback.current_time(),
        playback.window_size(),
    )
    .ok_or(PanelError::Degenerate {
        kind: surface.kind,
        width: surface.width,
        height: surface.height,
    })?;

    let axis = match surface.kind {
        PanelKind::Pitch => &PITCH_AXIS,
        PanelKind::Amplitude => &AMPLITUDE_AXIS,
        PanelKind::Correlation => &CORRELATION_AXIS,
    };

    let mut cmds = vec![DrawCommand::FillRect {
        x: 0.0,
        y: 0.0,
        width: surface.width as f32,
        height: surface.height as f32,
        color: BACKGROUND,
    }];
    draw_grid(&mut cmds, &layout, axis, window);

    let series = &result.series;
    let range = window.draw_range();
    let (peaks, troughs) = result.extrema.within(window.start_idx, window.end_idx);

    match surface.kind {
        PanelKind::Pitch => {
            let value = |i: usize| series.pitch_deviation[i];
            for run in voiced_runs(&series.voiced, range) {
                draw_curve(&mut cmds, &layout, axis, &series.times, run, value, PITCH, Some(PITCH_FILL));
            }
            draw_markers(&mut cmds, &layout, axis, &series.times, peaks, troughs, value);
        }
        PanelKind::Amplitude => {
            let value = |i: usize| series.amplitude_deviation[i];
            draw_curve(&mut cmds, &layout, axis, &series.times, range, value, AMPLITUDE, Some(AMPLITUDE_FILL));
            draw_markers(&mut cmds, &layout, axis, &series.times, peaks, troughs, value);
        }
        PanelKind::Correlation => {
            let amplitude = |i: usize| series.amplitude[i];
            let pitch = |i: usize| (series.pitch_deviation[i] - PITCH_AXIS.min) / (PITCH_AXIS.max - PITCH_AXIS.min);
            draw_curve(&mut cmds, &layout, axis, &series.times, range.clone(), amplitude, AMPLITUDE, Some(AMPLITUDE_FILL));
            for run in voiced_runs(&series.voiced, range) {
                draw_curve(&mut cmds, &layout, axis, &series.times, run, pitch, PITCH, None);
            }
            draw_markers(&mut cmds, &layout, axis, &series.times, peaks, troughs, pitch);
            cmds.push(DrawCommand::Text {
                position: [layout.right - 120.0, 4.0],
                text: format!("local r = {:+.2}", local_correlation),
                size: TITLE_SIZE,
                color: LABEL,
            });
        }
    }

    let playhead = layout.x(playback.current_time());
    cmds.push(DrawCommand::Line {
        from: [playhead, layout.top],
        to: [playhead, layout.bottom],
        width: 2.0,
        color: PLAYHEAD,
    });

    let title = match surface.kind {
        PanelKind::Pitch => format!("{}, ref {:.1} Hz", axis.title, result.baseline_hz),
        _ => axis.title.to_string(),
    };
    cmds.push(DrawCommand::Text {
        position: [layout.left, 4.0],
        text: title,
        size: TITLE_SIZE,
        color: LABEL,
    });

    Ok(cmds)
}

fn draw_grid(cmds: &mut Vec<DrawCommand>, layout: &Layout, axis: &Axis, window: &VisibleWindow) {
    for &value in axis.labels {
        let y = layout.y(value, axis.min, axis.max);
        let zero = value == 0.0 && axis.min < 0.0;
        cmds.push(DrawCommand::Line {
            from: [layout.left, y],
            to: [layout.right, y],
            width: 1.0,
            color: if zero { ZERO_LINE } else { GRID },
        });
        cmds.push(DrawCommand::Text {
            position: [4.0, y - LABEL_SIZE * 0.5],
            text: format_label(value, axis),
            size: LABEL_SIZE,
            color: LABEL,
        });
    }

    let first = window.time_start.ceil() as i64;
    let last = window.time_end.floor() as i64;
    for second in first..=last {
        let x = layout.x(second as f64);
        cmds.push(DrawCommand::Line {
            from: [x, layout.top],
            to: [x, layout.bottom],
            width: 1.0,
            color: GRID,
        });
        cmds.push(DrawCommand::Text {
            position: [x - 6.0, layout.bottom + 2.0],
            text: format!("{}s", second),
            size: LABEL_SIZE,
            color: LABEL,
        });
    }
}

fn format_label(value: f64, axis: &Axis) -> String {
    if axis.min >= 0.0 {
        format!("{}", value)
    } else if value == 0.0 {
        "0".to_string()
    } else {
        format!("{:+}", value)
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_curve(
    cmds: &mut Vec<DrawCommand>,
    layout: &Layout,
    axis: &Axis,
    times: &[f64],
    range: Range<usize>,
    value: impl Fn(usize) -> f64,
    stroke: Rgba,
    fill: Option<Rgba>,
) {
    if range.len() < 2 {
        return;
    }
    let points: Vec<[f32; 2]> = range
        .map(|i| [layout.x(times[i]), layout.y(value(i), axis.min, axis.max)])
        .collect();
    if let Some(color) = fill {
        cmds.push(DrawCommand::FilledCurve {
            points: points.clone(),
            baseline: layout.y(0.0f64.max(axis.min), axis.min, axis.max),
            color,
        });
    }
    cmds.push(DrawCommand::Polyline { points, width: 2.0, color: stroke });
}

fn draw_markers(
    cmds: &mut Vec<DrawCommand>,
    layout: &Layout,
    axis: &Axis,
    times: &[f64],
    peaks: &[usize],
    troughs: &[usize],
    value: impl Fn(usize) -> f64,
) {
    for (indices, color) in [(peaks, PEAK), (troughs, TROUGH)] {
        for &i in indices {
            cmds.push(DrawCommand::Marker {
                center: [layout.x(times[i]), layout.y(value(i), axis.min, axis.max)],
                radius: 4.0,
                color,
            });
        }
    }
}

/// Contiguous voiced sub-ranges of `range`.
fn voiced_runs(voiced: &[bool], range: Range<usize>) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = None;
    for i in range.clone() {
        match (voiced[i], start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(s..range.end);
    }
    runs
}
