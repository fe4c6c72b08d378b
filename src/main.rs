use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use vibrascope::analysis::{AnalysisParams, AnalysisResult, RunStatus, Session};
use vibrascope::audio::decode::decode_audio;
use vibrascope::audio::pitch::YinExtractor;
use vibrascope::cli::{AnalysisArgs, AnalyzeArgs, Cli, Command, RenderArgs};
use vibrascope::config::{self, parse_baseline, Config};
use vibrascope::encode::ffmpeg::{EncoderSettings, FfmpegEncoder};
use vibrascope::playback::PlaybackState;
use vibrascope::render::frame::{FrameRenderer, TEXTURE_FORMAT};
use vibrascope::render::gpu::GpuContext;
use vibrascope::render::pipeline::ShapePipeline;
use vibrascope::render::scene::BACKGROUND;
use vibrascope::render::tessellate::tessellate;
use vibrascope::render::text::TextOverlay;
use vibrascope::render::{render_tick, PanelSurface, Tick};
use vibrascope::ErrorReport;

type Outcome = std::result::Result<Arc<AnalysisResult>, ErrorReport>;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config = match config::find_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(err) if cli.config.is_some() => return Err(err),
            Err(err) => {
                log::warn!("Ignoring config: {:#}", err);
                Config::default()
            }
        },
        None => Config::default(),
    };

    match cli.command {
        Command::Analyze(args) => analyze(&args, &config),
        Command::Render(args) => render(&args, &config),
    }
}

fn analysis_params(config: &Config, overrides: &AnalysisArgs) -> Result<AnalysisParams> {
    let mut params = config.analysis.params()?;
    if let Some(min_magnitude) = overrides.min_magnitude {
        params.min_magnitude = min_magnitude;
    }
    if let Some(ref baseline) = overrides.baseline {
        params.deviation.baseline = parse_baseline(baseline, config.analysis.rolling_seconds)?;
    }
    Ok(params)
}

/// Decode and analyze `input`. Analysis failures come back as a report;
/// only plumbing problems are errors.
fn run_analysis(input: &Path, config: &Config, overrides: &AnalysisArgs) -> Result<Outcome> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    let params = analysis_params(config, overrides)?;

    log::info!("Decoding {}", input.display());
    let buffer = match decode_audio(input) {
        Ok(buffer) => buffer,
        Err(err) => return Ok(Err(err.report())),
    };
    log::info!("Decoded {:.1}s at {} Hz", buffer.duration(), buffer.sample_rate);

    let session = Session::new(Arc::new(YinExtractor::new(config.analysis.yin())), params);
    let run = session.submit(buffer);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]")?);
    spinner.set_message("Analyzing vibrato");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let status = loop {
        match session.wait(Duration::from_millis(250)) {
            RunStatus::Pending(_) | RunStatus::Idle => continue,
            done => break done,
        }
    };
    spinner.finish_and_clear();

    match status {
        RunStatus::Ready(id, result) if id == run => Ok(Ok(result)),
        RunStatus::Failed(_, report) => Ok(Err(report)),
        other => anyhow::bail!("analysis finished in an unexpected state: {:?}", other.run_id()),
    }
}

fn summarize(result: &AnalysisResult) {
    log::info!(
        "{} frames, {:.2}s, baseline {:.1} Hz",
        result.series.len(),
        result.duration,
        result.baseline_hz
    );
    log::info!(
        "{} oscillations, rate {:.2} Hz, extent {:.1} cents, correlation {:+.2}",
        result.oscillations,
        result.rate_hz,
        result.extent_cents,
        result.correlation
    );
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn analyze(args: &AnalyzeArgs, config: &Config) -> Result<()> {
    let outcome = run_analysis(&args.input, config, &args.analysis)?;

    let json = match &outcome {
        Ok(result) => to_json(&**result, args.pretty)?,
        Err(report) => to_json(report, args.pretty)?,
    };
    match &args.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }

    match outcome {
        Ok(result) => {
            summarize(&result);
            Ok(())
        }
        Err(report) => anyhow::bail!("{}: {}", report.kind, report.message),
    }
}

fn render(args: &RenderArgs, config: &Config) -> Result<()> {
    let result = match run_analysis(&args.input, config, &args.analysis)? {
        Ok(result) => result,
        Err(report) => anyhow::bail!("{}: {}", report.kind, report.message),
    };
    summarize(&result);

    let rc = &config.render;
    let width = args.width.unwrap_or(rc.width);
    let height = args.height.unwrap_or(rc.height);
    let fps = args.fps.unwrap_or(rc.fps).max(1);
    anyhow::ensure!(width > 0 && height > 0, "video size must be non-zero, got {}x{}", width, height);

    let mut playback = PlaybackState::new(result.duration).with_window(args.window.unwrap_or(rc.window));
    playback.seek(args.start);
    playback.play();
    let start = playback.current_time();
    let total_frames = ((result.duration - start) * fps as f64).floor() as u64 + 1;

    log::info!(
        "Rendering {} frames at {}x{} @ {}fps, {:.1}s window",
        total_frames,
        width,
        height,
        fps,
        playback.window_size()
    );

    let mut overlay = match args.font.as_ref().or(rc.font.as_ref()) {
        Some(path) => match TextOverlay::from_file(path) {
            Ok(overlay) => Some(overlay),
            Err(err) => {
                log::warn!("{:#}; axis labels and titles will be omitted", err);
                None
            }
        },
        None => {
            log::warn!("No font configured (--font); axis labels and titles will be omitted");
            None
        }
    };

    log::info!("Initializing GPU...");
    let gpu = GpuContext::new()?;
    let frame_renderer = FrameRenderer::new(&gpu, width, height);
    let shapes = ShapePipeline::new(&gpu.device, TEXTURE_FORMAT)?;

    let settings = EncoderSettings {
        width,
        height,
        fps,
        codec: args.codec.clone().unwrap_or_else(|| rc.codec.clone()),
        pix_fmt: args.pix_fmt.clone().unwrap_or_else(|| rc.pix_fmt.clone()),
        crf: args.crf.unwrap_or(rc.crf),
        audio_offset: start,
    };
    let mut encoder = FfmpegEncoder::new(&args.output, &args.input, &settings)?;

    let pb = ProgressBar::new(total_frames);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    let surfaces = PanelSurface::stacked(width, height);
    let mut failed_panels = HashSet::new();
    let mut previous: Option<Vec<u8>> = None;
    let mut skipped = 0u64;

    for frame_idx in 0..total_frames {
        let pixels = match render_tick(Some(&*result), &playback, &surfaces) {
            Tick::Draw(scene) => {
                for panel in &scene.panels {
                    if let Err(err) = &panel.outcome {
                        if failed_panels.insert(panel.surface.kind) {
                            log::warn!("{}", err);
                        }
                    }
                }
                let mesh = tessellate(&scene, width, height);
                let mut pixels = frame_renderer.render(&gpu, &shapes.pipeline, &mesh.vertices, BACKGROUND)?;
                if let Some(overlay) = overlay.as_mut() {
                    overlay.composite_all(&mut pixels, width, height, &mesh.texts);
                }
                pixels
            }
            Tick::Skip(reason) => {
                skipped += 1;
                log::debug!("Tick {} at {:.3}s skipped: {:?}", frame_idx, playback.current_time(), reason);
                match previous.take() {
                    Some(pixels) => pixels,
                    None => frame_renderer.render(&gpu, &shapes.pipeline, &[], BACKGROUND)?,
                }
            }
        };

        encoder.write_frame(&pixels)?;
        previous = Some(pixels);
        pb.set_position(frame_idx + 1);

        let next = start + (frame_idx + 1) as f64 / fps as f64;
        playback.advance(next - playback.current_time());
    }

    pb.finish_with_message("Rendering complete");
    if skipped > 0 {
        log::warn!("{} of {} ticks had nothing to draw", skipped, total_frames);
    }

    log::info!("Finishing encoding...");
    encoder.finish()?;

    log::info!("Done! Output: {}", args.output.display());
    Ok(())
}
