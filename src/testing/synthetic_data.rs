//! Synthetic sample generators
//!
//! Frames carry a moving gradient so encoders see temporal change; audio is a
//! 440 Hz tone.

use crate::types::{AudioSample, CameraPosition, VideoSample};
use std::time::Duration;

/// RGB24 gradient frame that shifts with `frame_number`
pub fn synthetic_video_sample(
    frame_number: u64,
    width: u32,
    height: u32,
    source: CameraPosition,
    pts: Duration,
) -> VideoSample {
    let mut data = vec![0u8; (width * height * 3) as usize];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }

    VideoSample::captured(source, pts, width, height, data.into())
}

/// Mono 48 kHz tone chunk following `chunk_number` earlier chunks
pub fn synthetic_audio_sample(chunk_number: u64, frames: usize, pts: Duration) -> AudioSample {
    let sample_rate = 48_000.0;
    let frequency = 440.0;

    let samples = (0..frames)
        .map(|i| {
            let t = (chunk_number as f64 * frames as f64 + i as f64) / sample_rate;
            (2.0 * std::f64::consts::PI * frequency * t).sin() as f32 * 0.3
        })
        .collect();

    AudioSample {
        pts,
        sample_rate: 48_000,
        channels: 1,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_sample_size() {
        let sample = synthetic_video_sample(3, 32, 24, CameraPosition::Back, Duration::ZERO);
        assert_eq!(sample.data.len(), sample.expected_len());
    }

    #[test]
    fn test_frames_differ_over_time() {
        let a = synthetic_video_sample(0, 8, 8, CameraPosition::Back, Duration::ZERO);
        let b = synthetic_video_sample(1, 8, 8, CameraPosition::Back, Duration::ZERO);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_audio_chunk_length() {
        let chunk = synthetic_audio_sample(0, 960, Duration::ZERO);
        assert_eq!(chunk.samples.len(), 960);
        assert_eq!(chunk.duration(), Duration::from_millis(20));
    }
}
