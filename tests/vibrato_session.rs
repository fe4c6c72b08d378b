use approx::assert_abs_diff_eq;
use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use vibrascope::analysis::{AnalysisParams, AnalysisResult, RunStatus, Session};
use vibrascope::audio::decode::SampleBuffer;
use vibrascope::audio::frames::{frame_count, FRAME_LENGTH, HOP_SIZE};
use vibrascope::audio::pitch::{PitchEstimate, PitchExtractor, PitchTrack};
use vibrascope::error::Result;
use vibrascope::playback::PlaybackState;
use vibrascope::render::tessellate::tessellate;
use vibrascope::render::{render_tick, DrawCommand, PanelKind, PanelSurface, SkipReason, Tick};

const SAMPLE_RATE: u32 = 44100;
const RATE_HZ: f64 = 5.5;
const DEPTH_CENTS: f64 = 40.0;

/// Reports a sinusoidal vibrato around 440 Hz, optionally silent over a span.
struct SungNote {
    gap: Option<(f64, f64)>,
}

impl PitchExtractor for SungNote {
    fn extract(&self, buffer: &SampleBuffer) -> Result<PitchTrack> {
        let n = frame_count(buffer.samples.len(), HOP_SIZE);
        let frames = (0..n)
            .map(|i| {
                let t = (i * HOP_SIZE) as f64 / buffer.sample_rate as f64;
                if self.gap.is_some_and(|(a, b)| t >= a && t < b) {
                    return PitchEstimate::unvoiced();
                }
                let cents = DEPTH_CENTS * (TAU * RATE_HZ * t).sin();
                PitchEstimate::voiced((440.0 * 2f64.powf(cents / 1200.0)) as f32, 0.95)
            })
            .collect();
        Ok(PitchTrack {
            hop_size: HOP_SIZE,
            frame_length: FRAME_LENGTH,
            frames,
        })
    }
}

/// 440 Hz carrier whose loudness swells in phase with the pitch.
fn sung_note(seconds: f64) -> SampleBuffer {
    let n = (seconds * SAMPLE_RATE as f64) as usize;
    let samples = (0..n)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            let envelope = 0.4 * (1.0 + 0.3 * (TAU * RATE_HZ * t).sin());
            (envelope * (TAU * 440.0 * t).sin()) as f32
        })
        .collect();
    SampleBuffer::new(samples, SAMPLE_RATE)
}

fn analyze(extractor: SungNote, seconds: f64) -> RunStatus {
    let session = Session::new(Arc::new(extractor), AnalysisParams::default());
    let run = session.submit(sung_note(seconds));
    let status = session.wait(Duration::from_secs(60));
    assert_eq!(status.run_id(), Some(run));
    status
}

fn ready(extractor: SungNote, seconds: f64) -> Arc<AnalysisResult> {
    match analyze(extractor, seconds) {
        RunStatus::Ready(_, result) => result,
        other => panic!("analysis did not finish: {:?}", other.run_id()),
    }
}

#[test]
fn session_delivers_a_consistent_result() {
    let result = ready(SungNote { gap: None }, 6.0);

    assert!(result.series.is_aligned());
    assert_eq!(result.series.len(), frame_count(6 * SAMPLE_RATE as usize, HOP_SIZE));
    assert_abs_diff_eq!(result.baseline_hz, 440.0, epsilon = 1.0);
    assert!((31..=34).contains(&result.oscillations), "oscillations = {}", result.oscillations);
    assert_abs_diff_eq!(result.rate_hz, RATE_HZ, epsilon = 0.4);
    assert!(result.extent_cents > 20.0 && result.extent_cents <= DEPTH_CENTS);
    assert!(result.correlation > 0.5, "pitch and loudness move together, r = {}", result.correlation);

    for &i in &result.extrema.peaks {
        assert!(result.series.pitch_deviation[i] >= 10.0);
    }
    for &i in &result.extrema.troughs {
        assert!(result.series.pitch_deviation[i] <= -10.0);
    }
    assert!(result.series.amplitude.iter().all(|a| (0.0..=1.0).contains(a)));
}

#[test]
fn result_serializes_with_camel_case_fields() {
    let result = ready(SungNote { gap: None }, 2.0);
    let json = serde_json::to_value(&*result).unwrap();
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
        assert!(json.get(key).is_some(), "missing {key}");
    }
    assert_eq!(json["sampleRate"], 44100);
}

#[test]
fn silent_take_fails_with_a_report() {
    let status = analyze(SungNote { gap: Some((0.0, 10.0)) }, 1.0);
    let RunStatus::Failed(_, report) = status else {
        panic!("expected a failure");
    };
    assert_eq!(report.kind, "InsufficientVoicingError");
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["kind"], "InsufficientVoicingError");
    assert!(json["message"].as_str().is_some_and(|m| !m.is_empty()));
}

#[test]
fn playback_drives_every_tick_through_the_clip() {
    let result = ready(SungNote { gap: Some((2.0, 2.3)) }, 4.0);
    let surfaces = PanelSurface::stacked(960, 540);

    assert_eq!(
        render_tick(None, &PlaybackState::new(result.duration), &surfaces),
        Tick::Skip(SkipReason::NoResult)
    );

    let mut playback = PlaybackState::new(result.duration).with_window(3.0);
    playback.play();
    let mut ticks = 0;
    while playback.is_playing() {
        let Tick::Draw(scene) = render_tick(Some(&*result), &playback, &surfaces) else {
            panic!("tick at {:.3}s was skipped", playback.current_time());
        };
        assert_eq!(scene.panels.len(), 3);
        assert!(scene.panels.iter().all(|p| p.outcome.is_ok()));
        assert!(scene.window.time_end - scene.window.time_start <= 3.0 + 1e-9);

        let mesh = tessellate(&scene, 960, 540);
        assert!(!mesh.vertices.is_empty());
        assert_eq!(mesh.vertices.len() % 3, 0);

        playback.advance(1.0 / 30.0);
        ticks += 1;
    }
    assert!(ticks >= 115, "only {ticks} ticks");
    assert_eq!(playback.current_time(), result.duration);
}

#[test]
fn unvoiced_gap_breaks_the_pitch_curve() {
    let result = ready(SungNote { gap: Some((2.0, 2.3)) }, 4.0);
    let surfaces = PanelSurface::stacked(960, 540);
    let mut playback = PlaybackState::new(result.duration).with_window(3.0);
    playback.seek(3.5);

    let Tick::Draw(scene) = render_tick(Some(&*result), &playback, &surfaces) else {
        panic!("expected a drawable tick");
    };
    let pitch = scene
        .panels
        .iter()
        .find(|p| p.surface.kind == PanelKind::Pitch)
        .unwrap();
    let curves = pitch
        .outcome
        .as_ref()
        .unwrap()
        .iter()
        .filter(|c| matches!(c, DrawCommand::Polyline { .. }))
        .count();
    assert_eq!(curves, 2);
}

#[test]
fn dragging_holds_the_window_until_release() {
    let result = ready(SungNote { gap: None }, 4.0);
    let surfaces = PanelSurface::stacked(960, 540);
    let mut playback = PlaybackState::new(result.duration);
    playback.play();
    playback.advance(3.0);

    playback.begin_drag();
    playback.drag_to(1.5);
    playback.advance(0.5);
    let Tick::Draw(held) = render_tick(Some(&*result), &playback, &surfaces) else {
        panic!("expected a drawable tick");
    };
    assert_eq!(held.window.time_end, 1.5);

    playback.end_drag();
    playback.advance(0.5);
    let Tick::Draw(resumed) = render_tick(Some(&*result), &playback, &surfaces) else {
        panic!("expected a drawable tick");
    };
    assert_abs_diff_eq!(resumed.window.time_end, 2.0, epsilon = 1e-9);
}
