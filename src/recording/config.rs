//! Writer settings and recording statistics

use crate::config::RecordingConfig;
use crate::types::{AudioCodec, Resolution};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Audio track parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioTrackSettings {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
}

/// Everything a container writer needs to set up its encoder inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_bitrate: u32,
    /// `None` records a video-only file
    pub audio: Option<AudioTrackSettings>,
    /// Optional title metadata
    pub title: Option<String>,
}

impl WriterSettings {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            video_bitrate: 5_000_000,
            audio: None,
            title: None,
        }
    }

    /// Settings for a negotiated resolution, or the configured fallback
    pub fn for_recording(
        resolution: Option<Resolution>,
        fps: Option<f64>,
        config: &RecordingConfig,
        with_audio: bool,
    ) -> Self {
        let resolution = resolution.unwrap_or_else(|| config.fallback_resolution());
        let fps = fps
            .filter(|fps| *fps > 0.0)
            .unwrap_or(config.fallback_fps as f64);

        let audio = with_audio.then_some(AudioTrackSettings {
            codec: config.audio_codec,
            sample_rate: config.audio_sample_rate,
            channels: config.audio_channels,
            bitrate: config.audio_bitrate,
        });

        Self {
            width: resolution.width,
            height: resolution.height,
            fps,
            video_bitrate: config.video_bitrate,
            audio,
            title: None,
        }
    }

    pub fn with_audio(mut self, audio: AudioTrackSettings) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Dimensions rounded down to even values, as 4:2:0 chroma requires
    pub fn even_dimensions(&self) -> (u32, u32) {
        ((self.width & !1).max(2), (self.height & !1).max(2))
    }

    pub fn frame_duration(&self) -> Duration {
        crate::timing::frame_duration(self.fps)
    }
}

/// Statistics returned after finishing a recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub path: PathBuf,
    /// Video frames written, filler included
    pub video_frames: u64,
    /// Synthesized frames written across camera switches
    pub filler_frames: u64,
    pub audio_chunks: u64,
    /// Samples refused as out of order, unready or malformed
    pub dropped_samples: u64,
    /// Span of the written timeline in seconds
    pub duration_secs: f64,
    pub bytes_written: u64,
}

impl RecordingSummary {
    /// Average bitrate of the written file
    pub fn avg_bitrate(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.bytes_written as f64 * 8.0) / self.duration_secs
        } else {
            0.0
        }
    }
}
