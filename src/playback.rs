//! Playback position, the visible time window, and the drag/clock exclusion.
//!
//! Two writers move `current_time`: the playback clock (`advance`) and the
//! user (`seek`, drag). While a drag is active the clock is ignored, and on
//! release the clock continues from wherever the drag left the playhead.

pub const MIN_WINDOW: f64 = 2.0;
pub const MAX_WINDOW: f64 = 10.0;
pub const DEFAULT_WINDOW: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    current_time: f64,
    is_playing: bool,
    window_size: f64,
    duration: f64,
    dragging: bool,
}

impl PlaybackState {
    pub fn new(duration: f64) -> Self {
        Self {
            current_time: 0.0,
            is_playing: false,
            window_size: DEFAULT_WINDOW,
            duration: duration.max(0.0),
            dragging: false,
        }
    }

    pub fn with_window(mut self, seconds: f64) -> Self {
        self.set_window_size(seconds);
        self
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn window_size(&self) -> f64 {
        self.window_size
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn set_window_size(&mut self, seconds: f64) {
        self.window_size = if seconds.is_finite() {
            seconds.clamp(MIN_WINDOW, MAX_WINDOW)
        } else {
            DEFAULT_WINDOW
        };
    }

    /// Start playing; from the end, playback restarts at zero.
    pub fn play(&mut self) {
        if self.current_time >= self.duration {
            self.current_time = 0.0;
        }
        self.is_playing = true;
    }

    pub fn pause(&mut self) {
        self.is_playing = false;
    }

    /// Clock tick. Returns whether the position moved. Stops at the end.
    pub fn advance(&mut self, dt: f64) -> bool {
        if !self.is_playing || self.dragging || !(dt > 0.0) {
            return false;
        }
        let before = self.current_time;
        self.current_time = (self.current_time + dt).min(self.duration);
        if self.current_time >= self.duration {
            self.is_playing = false;
        }
        self.current_time != before
    }

    pub fn seek(&mut self, time: f64) {
        self.current_time = self.clamp_time(time);
    }

    pub fn begin_drag(&mut self) {
        self.dragging = true;
    }

    /// Move the playhead while dragging. Ignored outside a drag.
    pub fn drag_to(&mut self, time: f64) {
        if self.dragging {
            self.current_time = self.clamp_time(time);
        }
    }

    /// Dragging the trace right by `dx` pixels scrolls back in time.
    pub fn drag_by_pixels(&mut self, dx: f64, seconds_per_pixel: f64) {
        let target = self.current_time - dx * seconds_per_pixel;
        self.drag_to(target);
    }

    pub fn end_drag(&mut self) {
        self.dragging = false;
    }

    pub fn visible_window(&self, times: &[f64]) -> Option<VisibleWindow> {
        VisibleWindow::resolve(times, self.current_time, self.window_size)
    }

    fn clamp_time(&self, time: f64) -> f64 {
        if time.is_finite() {
            time.clamp(0.0, self.duration)
        } else {
            self.current_time
        }
    }
}

/// The trailing slice of the clip on screen for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleWindow {
    pub time_start: f64,
    pub time_end: f64,
    /// First frame with `time >= time_start`.
    pub start_idx: usize,
    /// First frame with `time >= time_end`.
    pub end_idx: usize,
}

impl VisibleWindow {
    pub fn resolve(times: &[f64], current_time: f64, window_size: f64) -> Option<Self> {
        if !current_time.is_finite() || current_time < 0.0 {
            return None;
        }
        let time_start = (current_time - window_size).max(0.0);
        let time_end = current_time;
        let start_idx = first_at_or_after(times, time_start)?;
        let end_idx = first_at_or_after(times, time_end)?;
        Some(Self {
            time_start,
            time_end,
            start_idx,
            end_idx,
        })
    }

    /// Indices drawn this tick, including the frame under the playhead.
    pub fn draw_range(&self) -> std::ops::Range<usize> {
        self.start_idx..self.end_idx + 1
    }
}

fn first_at_or_after(times: &[f64], t: f64) -> Option<usize> {
    let idx = times.partition_point(|&x| x < t);
    (idx < times.len()).then_some(idx)
}
