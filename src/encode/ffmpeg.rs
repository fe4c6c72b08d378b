use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    /// Seek applied to the audio input so it lines up with the first frame.
    pub audio_offset: f64,
}

/// Raw RGBA frames on stdin, muxed with the source audio.
pub struct FfmpegEncoder {
    child: Child,
    frames: u64,
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, input_audio: &Path, settings: &EncoderSettings) -> Result<Self> {
        let args = build_args(output_path, input_audio, settings);
        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn ffmpeg; is it installed and on PATH?")?;

        log::info!(
            "ffmpeg started: {}x{} @ {}fps, codec={}",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec
        );

        Ok(Self { child, frames: 0 })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        let stdin = self.child.stdin.as_mut().context("ffmpeg stdin is closed")?;
        stdin
            .write_all(rgba_pixels)
            .with_context(|| format!("failed to write frame {} to ffmpeg", self.frames))?;
        self.frames += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("failed to wait for ffmpeg")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg exited with {}:\n{}", output.status, stderr);
        }

        log::info!("ffmpeg finished after {} frames", self.frames);
        Ok(())
    }
}

fn build_args(output_path: &Path, input_audio: &Path, s: &EncoderSettings) -> Vec<OsString> {
    let size = format!("{}x{}", s.width, s.height);
    let fps = s.fps.to_string();
    let crf = s.crf.to_string();
    let offset = format!("{:.3}", s.audio_offset);

    let mut args: Vec<&OsStr> = ["-y", "-f", "rawvideo", "-pixel_format", "rgba", "-video_size", size.as_str()]
        .into_iter()
        .chain(["-framerate", fps.as_str(), "-i", "pipe:0"])
        .map(OsStr::new)
        .collect();
    if s.audio_offset > 0.0 {
        args.extend([OsStr::new("-ss"), OsStr::new(offset.as_str())]);
    }
    args.extend([OsStr::new("-i"), input_audio.as_os_str()]);
    args.extend(
        [
            "-c:v",
            s.codec.as_str(),
            "-pix_fmt",
            s.pix_fmt.as_str(),
            "-crf",
            crf.as_str(),
            "-preset",
            "medium",
            "-c:a",
            "aac",
            "-b:a",
            "192k",
            "-shortest",
        ]
        .map(OsStr::new),
    );
    args.push(output_path.as_os_str());

    args.into_iter().map(OsStr::to_os_string).collect()
}
