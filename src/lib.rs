//! Vibrato analysis of monophonic recordings and a windowed, three-panel
//! playback renderer for the result.
//!
//! The analysis side turns decoded audio into aligned per-frame series (pitch
//! deviation in cents, amplitude deviation in percent, normalized amplitude)
//! plus pitch extrema and a pitch/amplitude correlation. The render side maps
//! a loaded result and a playback position to draw instructions for one tick.

pub mod analysis;
pub mod audio;
pub mod cli;
pub mod config;
pub mod encode;
pub mod error;
pub mod playback;
pub mod render;

pub use error::{AnalysisError, ErrorReport};
