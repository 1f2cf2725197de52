//! Audio track encoders
//!
//! Both codecs consume fixed-size PCM frames. [`PcmFramer`] buffers incoming
//! chunks into those frames and timestamps each one from the first buffered
//! sample plus the frames emitted since, so chunk boundaries never introduce
//! drift.

use super::aac::AacEncoder;
use super::opus::OpusEncoder;
use crate::errors::CameraError;
use crate::recording::AudioTrackSettings;
use crate::types::{AudioCodec, AudioSample};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AudioPacket {
    pub data: Vec<u8>,
    /// Capture-clock time of the packet's first sample
    pub pts: Duration,
}

pub trait AudioEncoder: Send {
    fn codec(&self) -> AudioCodec;
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;

    /// Encode a chunk already conformed to this encoder's rate and channel count
    fn encode(&mut self, sample: &AudioSample) -> Result<Vec<AudioPacket>, CameraError>;

    /// Pad and encode whatever is buffered
    fn flush(&mut self) -> Result<Vec<AudioPacket>, CameraError>;
}

/// Encoder for a track; Opus always runs at 48kHz
pub fn create_encoder(track: &AudioTrackSettings) -> Result<Box<dyn AudioEncoder>, CameraError> {
    let encoder: Box<dyn AudioEncoder> = match track.codec {
        AudioCodec::Aac => Box::new(AacEncoder::new(track.sample_rate, track.channels, track.bitrate)?),
        AudioCodec::Opus => Box::new(OpusEncoder::new(track.channels, track.bitrate)?),
    };
    log::debug!(
        "{:?} encoder: {}Hz x{} at {}bps",
        track.codec,
        encoder.sample_rate(),
        encoder.channels(),
        track.bitrate
    );
    Ok(encoder)
}

/// Interleaved PCM cut into frames of `frame_samples` per channel
pub(crate) struct PcmFramer {
    frame_samples: usize,
    sample_rate: u32,
    channels: u16,
    pending: Vec<f32>,
    origin: Option<Duration>,
}

impl PcmFramer {
    pub(crate) fn new(frame_samples: usize, sample_rate: u32, channels: u16) -> Self {
        Self {
            frame_samples,
            sample_rate,
            channels,
            pending: Vec::with_capacity(frame_samples * channels as usize * 2),
            origin: None,
        }
    }

    pub(crate) fn frame_len(&self) -> usize {
        self.frame_samples * self.channels as usize
    }

    pub(crate) fn push(&mut self, sample: &AudioSample) -> Result<(), CameraError> {
        if sample.sample_rate != self.sample_rate || sample.channels != self.channels {
            return Err(CameraError::encoding(format!(
                "expected {}Hz x{}, got {}Hz x{}",
                self.sample_rate, self.channels, sample.sample_rate, sample.channels
            )));
        }
        if self.origin.is_none() && !sample.samples.is_empty() {
            self.origin = Some(sample.pts);
        }
        self.pending.extend_from_slice(&sample.samples);
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Option<Vec<f32>> {
        let frame_len = self.frame_len();
        (self.pending.len() >= frame_len).then(|| self.pending.drain(..frame_len).collect())
    }

    /// Complete a partial frame with silence; false when nothing was pending
    pub(crate) fn pad(&mut self) -> bool {
        let frame_len = self.frame_len();
        let remainder = self.pending.len() % frame_len;
        if remainder != 0 {
            self.pending.resize(self.pending.len() + frame_len - remainder, 0.0);
        }
        !self.pending.is_empty()
    }

    /// Start time of frame `index`
    pub(crate) fn pts(&self, index: u64) -> Duration {
        let origin = self.origin.unwrap_or(Duration::ZERO);
        origin
            + Duration::from_micros(
                index * self.frame_samples as u64 * 1_000_000 / self.sample_rate.max(1) as u64,
            )
    }
}

/// Resample (linear) and remix a chunk to `rate` Hz with `channels` channels
pub fn conform(sample: &AudioSample, rate: u32, channels: u16) -> AudioSample {
    let src_channels = sample.channels.max(1) as usize;
    let dst_channels = channels.max(1) as usize;

    let mixed: Vec<f32> = sample
        .samples
        .chunks_exact(src_channels)
        .map(|frame| frame.iter().sum::<f32>() / src_channels as f32)
        .collect();

    let resampled = if sample.sample_rate == rate || mixed.is_empty() {
        mixed
    } else {
        let ratio = sample.sample_rate as f64 / rate as f64;
        let out_len = ((mixed.len() as f64) / ratio).round().max(1.0) as usize;
        (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let base = pos.floor() as usize;
                let frac = (pos - base as f64) as f32;
                let a = mixed[base.min(mixed.len() - 1)];
                let b = mixed[(base + 1).min(mixed.len() - 1)];
                a + (b - a) * frac
            })
            .collect()
    };

    let samples = if dst_channels == 1 {
        resampled
    } else {
        resampled
            .iter()
            .flat_map(|v| std::iter::repeat(*v).take(dst_channels))
            .collect()
    };

    AudioSample {
        pts: sample.pts,
        sample_rate: rate,
        channels,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(pts_ms: u64, frames: usize, rate: u32, channels: u16) -> AudioSample {
        AudioSample {
            pts: Duration::from_millis(pts_ms),
            sample_rate: rate,
            channels,
            samples: vec![0.25; frames * channels as usize],
        }
    }

    #[test]
    fn test_framer_cuts_frames_and_keeps_origin() {
        let mut framer = PcmFramer::new(960, 48_000, 1);
        framer.push(&chunk(500, 480, 48_000, 1)).unwrap();
        assert!(framer.next_frame().is_none());
        framer.push(&chunk(510, 1500, 48_000, 1)).unwrap();
        assert_eq!(framer.next_frame().unwrap().len(), 960);
        assert_eq!(framer.next_frame().unwrap().len(), 960);
        assert!(framer.next_frame().is_none());

        assert!(framer.pad());
        assert_eq!(framer.next_frame().unwrap().len(), 960);
        assert!(!framer.pad());
        assert_eq!(framer.pts(0), Duration::from_millis(500));
        assert_eq!(framer.pts(2), Duration::from_millis(540));
    }

    #[test]
    fn test_framer_rejects_mismatched_chunk() {
        let mut framer = PcmFramer::new(1024, 48_000, 1);
        assert!(framer.push(&chunk(0, 960, 44_100, 1)).is_err());
        assert!(framer.push(&chunk(0, 960, 48_000, 2)).is_err());
    }

    #[test]
    fn test_conform_downmix_and_resample() {
        let stereo = chunk(0, 441, 44_100, 2);
        let mono = conform(&stereo, 48_000, 1);
        assert_eq!(mono.channels, 1);
        assert_eq!(mono.sample_rate, 48_000);
        assert_eq!(mono.samples.len(), 480);
        assert!((mono.samples[10] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_factory_honours_codec() {
        let track = AudioTrackSettings {
            codec: AudioCodec::Opus,
            sample_rate: 44_100,
            channels: 1,
            bitrate: 64_000,
        };
        let opus = create_encoder(&track).unwrap();
        assert_eq!(opus.codec(), AudioCodec::Opus);
        assert_eq!(opus.sample_rate(), 48_000);

        let aac = create_encoder(&AudioTrackSettings { codec: AudioCodec::Aac, ..track }).unwrap();
        assert_eq!(aac.codec(), AudioCodec::Aac);
        assert_eq!(aac.sample_rate(), 44_100);
    }
}
