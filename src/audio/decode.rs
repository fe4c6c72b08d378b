use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, SampleBuffer as InterleavedBuffer};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{AnalysisError, Result};

/// Mono samples at a fixed rate. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn decode_err(what: &str, err: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::Decode(format!("{what}: {err}"))
}

/// Decode any container symphonia can probe and downmix it to mono.
pub fn decode_audio(path: &Path) -> Result<SampleBuffer> {
    let file = std::fs::File::open(path)
        .map_err(|e| decode_err(&format!("failed to open {}", path.display()), e))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_err("failed to probe audio format", e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| AnalysisError::Decode("no audio tracks found".into()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err("failed to create audio decoder", e))?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(decode_err("failed to read packet", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(msg)) => {
                log::debug!("Skipping corrupt packet: {}", msg);
                continue;
            }
            Err(e) => return Err(decode_err("failed to decode packet", e)),
        };

        let rate = append_mono(decoded, &mut all_samples);
        sample_rate.get_or_insert(rate);
    }

    if all_samples.is_empty() {
        return Err(AnalysisError::Decode(format!(
            "{} contains no audio samples",
            path.display()
        )));
    }

    let sample_rate = sample_rate.ok_or_else(|| AnalysisError::Decode("unknown sample rate".into()))?;
    let buffer = SampleBuffer::new(all_samples, sample_rate);
    log::info!(
        "Decoded audio: {} samples, {}Hz, {:.1}s",
        buffer.samples.len(),
        sample_rate,
        buffer.duration()
    );

    Ok(buffer)
}

/// Downmix one decoded packet onto `out`, using the channel layout the packet
/// itself carries. Returns the packet's sample rate.
fn append_mono(decoded: AudioBufferRef<'_>, out: &mut Vec<f32>) -> u32 {
    let spec = *decoded.spec();
    let mut interleaved = InterleavedBuffer::<f32>::new(decoded.frames() as u64, spec);
    interleaved.copy_interleaved_ref(decoded);
    downmix_into(interleaved.samples(), spec.channels.count(), out);
    spec.rate
}

fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    for frame_samples in interleaved.chunks(channels) {
        let mono: f32 = frame_samples.iter().sum::<f32>() / channels as f32;
        out.push(mono);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use symphonia::core::audio::{AudioBuffer, Channels, Signal, SignalSpec};

    #[test]
    fn downmix_averages_channels() {
        let mut out = Vec::new();
        downmix_into(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2, &mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn packet_layout_decides_the_downmix() {
        let spec = SignalSpec::new(22050, Channels::FRONT_LEFT | Channels::FRONT_RIGHT);
        let mut stereo = AudioBuffer::<f32>::new(64, spec);
        stereo.render_reserved(Some(40));
        stereo.chan_mut(0).fill(1.0);
        stereo.chan_mut(1).fill(0.0);

        let mut out = Vec::new();
        let rate = append_mono(AudioBufferRef::F32(Cow::Borrowed(&stereo)), &mut out);
        assert_eq!(rate, 22050);
        assert_eq!(out.len(), 40);
        assert!(out.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let err = decode_audio(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert_eq!(err.kind(), "DecodeError");
    }

    #[test]
    fn duration_of_empty_rate_is_zero() {
        assert_eq!(SampleBuffer::new(vec![0.0; 10], 0).duration(), 0.0);
        assert_eq!(SampleBuffer::new(vec![0.0; 22050], 44100).duration(), 0.5);
    }
}
