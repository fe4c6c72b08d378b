//! Centered analysis framing shared by pitch extraction and the RMS envelope.
//!
//! Frame `i` is centered on sample `i * hop_size` and zero-padded past either
//! end of the buffer, so a buffer of `len` samples yields `1 + len / hop_size`
//! frames and frame times are exact multiples of the hop duration.

pub const FRAME_LENGTH: usize = 2048;
pub const HOP_SIZE: usize = 512;

pub fn frame_count(len: usize, hop_size: usize) -> usize {
    if len == 0 || hop_size == 0 {
        return 0;
    }
    1 + len / hop_size
}

/// Copy the centered frame `index` into `out` (length = frame length).
pub fn fill_frame(samples: &[f32], index: usize, hop_size: usize, out: &mut [f32]) {
    let frame_length = out.len();
    let center = (index * hop_size) as isize;
    let start = center - (frame_length / 2) as isize;
    for (i, slot) in out.iter_mut().enumerate() {
        let pos = start + i as isize;
        *slot = if pos >= 0 && (pos as usize) < samples.len() {
            samples[pos as usize]
        } else {
            0.0
        };
    }
}

/// Root-mean-square of every centered frame.
pub fn frame_rms(samples: &[f32], frame_length: usize, hop_size: usize) -> Vec<f32> {
    let n = frame_count(samples.len(), hop_size);
    let mut frame = vec![0.0f32; frame_length];
    (0..n)
        .map(|i| {
            fill_frame(samples, i, hop_size, &mut frame);
            rms(&frame)
        })
        .collect()
}

pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// Symmetric Hann window (endpoints are zero).
pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

/// Linearly resample `values` onto `target_len` evenly spaced points.
pub fn resample_linear(values: &[f32], target_len: usize) -> Vec<f32> {
    if values.len() == target_len || values.is_empty() || target_len == 0 {
        return values.iter().copied().take(target_len).collect();
    }
    if target_len == 1 {
        return vec![values[0]];
    }
    let last = (values.len() - 1) as f32;
    (0..target_len)
        .map(|i| {
            let pos = i as f32 * last / (target_len - 1) as f32;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(values.len() - 1);
            let frac = pos - lo as f32;
            values[lo] * (1.0 - frac) + values[hi] * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn frame_count_includes_leading_centered_frame() {
        assert_eq!(frame_count(0, 512), 0);
        assert_eq!(frame_count(511, 512), 1);
        assert_eq!(frame_count(44100, 512), 87);
    }

    #[test]
    fn first_frame_is_half_padded() {
        let samples: Vec<f32> = (1..=8).map(|v| v as f32).collect();
        let mut out = [0.0f32; 4];
        fill_frame(&samples, 0, 2, &mut out);
        assert_eq!(out, [0.0, 0.0, 1.0, 2.0]);
        fill_frame(&samples, 4, 2, &mut out);
        assert_eq!(out, [7.0, 8.0, 0.0, 0.0]);
    }

    #[test]
    fn rms_of_full_scale_square_is_one() {
        let square: Vec<f32> = (0..64).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert_relative_eq!(rms(&square), 1.0);
    }

    #[test]
    fn resample_keeps_endpoints() {
        let out = resample_linear(&[0.0, 1.0, 2.0], 5);
        assert_eq!(out.len(), 5);
        assert_relative_eq!(out[0], 0.0);
        assert_relative_eq!(out[2], 1.0);
        assert_relative_eq!(out[4], 2.0);
        assert_relative_eq!(out[1], 0.5);
    }
}
