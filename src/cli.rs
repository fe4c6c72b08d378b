use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vibrascope", version, about = "Vibrato analysis and scrolling three-panel playback video")]
pub struct Cli {
    /// Config file (defaults to ./vibrascope.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a recording and write the result as JSON
    Analyze(AnalyzeArgs),
    /// Analyze a recording and render the synchronized panels to a video
    Render(RenderArgs),
}

/// Analysis overrides shared by both subcommands.
#[derive(Args, Debug, Default)]
pub struct AnalysisArgs {
    /// Minimum |cents| for a peak or trough
    #[arg(long)]
    pub min_magnitude: Option<f64>,

    /// Pitch baseline: median, rolling, or a reference frequency in Hz
    #[arg(long)]
    pub baseline: Option<String>,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pretty-print the JSON
    #[arg(long)]
    pub pretty: bool,

    #[command(flatten)]
    pub analysis: AnalysisArgs,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Output video file
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Video width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Video height in pixels (split evenly between the three panels)
    #[arg(long)]
    pub height: Option<u32>,

    /// Frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Visible window in seconds (clamped to 2-10)
    #[arg(long)]
    pub window: Option<f64>,

    /// Start playback at this time in seconds
    #[arg(long, default_value_t = 0.0)]
    pub start: f64,

    /// H.264 CRF quality (0-51, lower = better)
    #[arg(long)]
    pub crf: Option<u32>,

    /// FFmpeg video codec
    #[arg(long)]
    pub codec: Option<String>,

    /// FFmpeg pixel format
    #[arg(long)]
    pub pix_fmt: Option<String>,

    /// TTF/OTF font for axis labels and titles; labels are omitted without one
    #[arg(long)]
    pub font: Option<PathBuf>,

    #[command(flatten)]
    pub analysis: AnalysisArgs,
}
