//! MP4 container writer: openh264 video, AAC-LC or Opus audio, muxide muxing

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::imageops::{self, FilterType};
use image::RgbImage;
use muxide::api::{Metadata, Muxer, MuxerBuilder, VideoCodec};

use super::config::{RecordingSummary, WriterSettings};
use super::encoder::H264Encoder;
use super::writer::{discard_file, ContainerWriter, WriterFactory, WriterStatus};
use crate::errors::CameraError;
use crate::types::{AudioSample, FrameKind, VideoSample};

#[cfg(feature = "audio")]
use crate::audio::{conform, create_encoder, AudioEncoder, AudioPacket};
#[cfg(feature = "audio")]
use crate::types::AudioCodec;
#[cfg(feature = "audio")]
use muxide::api::{AacProfile, AudioCodec as TrackCodec};

/// Produces [`Mp4Writer`]s
#[derive(Debug, Clone)]
pub struct Mp4WriterFactory {
    fast_start: bool,
}

impl Mp4WriterFactory {
    pub fn new() -> Self {
        Self { fast_start: true }
    }

    /// Place the moov box before the media data
    pub fn with_fast_start(mut self, fast_start: bool) -> Self {
        self.fast_start = fast_start;
        self
    }
}

impl Default for Mp4WriterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterFactory for Mp4WriterFactory {
    fn file_extension(&self) -> &str {
        "mp4"
    }

    fn create(
        &self,
        path: &Path,
        settings: &WriterSettings,
    ) -> Result<Box<dyn ContainerWriter>, CameraError> {
        Ok(Box::new(Mp4Writer::create(path, settings, self.fast_start)?))
    }
}

pub struct Mp4Writer {
    path: PathBuf,
    status: WriterStatus,
    anchor: Duration,
    width: u32,
    height: u32,
    encoder: H264Encoder,
    muxer: Muxer<BufWriter<File>>,
    #[cfg(feature = "audio")]
    audio: Option<Box<dyn AudioEncoder>>,
    filler_frames: u64,
    audio_chunks: u64,
    skipped: u64,
}

impl Mp4Writer {
    pub fn create(
        path: &Path,
        settings: &WriterSettings,
        fast_start: bool,
    ) -> Result<Self, CameraError> {
        let (width, height) = settings.even_dimensions();
        let encoder = H264Encoder::new(width, height, settings.fps)
            .map_err(|e| CameraError::writer_setup(e.to_string()))?;

        let file = File::create(path).map_err(|e| {
            CameraError::writer_setup(format!("Failed to create output file: {}", e))
        })?;

        let mut metadata = Metadata::new().with_current_time();
        if let Some(title) = &settings.title {
            metadata = metadata.with_title(title);
        }

        let builder = MuxerBuilder::new(BufWriter::new(file))
            .video(VideoCodec::H264, width, height, settings.fps)
            .with_fast_start(fast_start)
            .with_metadata(metadata);

        #[cfg(feature = "audio")]
        let (builder, audio) = match settings.audio {
            Some(track) => {
                let encoder = create_encoder(&track)
                    .map_err(|e| CameraError::writer_setup(e.to_string()))?;
                let codec = match encoder.codec() {
                    AudioCodec::Aac => TrackCodec::Aac(AacProfile::Lc),
                    AudioCodec::Opus => TrackCodec::Opus,
                };
                let builder = builder.audio(codec, encoder.sample_rate(), encoder.channels());
                (builder, Some(encoder))
            }
            None => (builder, None),
        };
        #[cfg(not(feature = "audio"))]
        if settings.audio.is_some() {
            log::warn!("Built without audio support, recording video only");
        }

        let muxer = match builder.build() {
            Ok(muxer) => muxer,
            Err(e) => {
                discard_file(path);
                return Err(CameraError::writer_setup(format!(
                    "Failed to create muxer: {}",
                    e
                )));
            }
        };

        log::debug!("MP4 writer ready: {:?} {}x{}", path, width, height);
        Ok(Self {
            path: path.to_path_buf(),
            status: WriterStatus::Unknown,
            anchor: Duration::ZERO,
            width,
            height,
            encoder,
            muxer,
            #[cfg(feature = "audio")]
            audio,
            filler_frames: 0,
            audio_chunks: 0,
            skipped: 0,
        })
    }

    fn timestamp(&self, pts: Duration) -> f64 {
        pts.saturating_sub(self.anchor).as_secs_f64()
    }

    /// RGB24 at the encoder size; other sizes are scaled
    fn conform_frame(&self, sample: &VideoSample) -> Result<Vec<u8>, CameraError> {
        if sample.data.len() != sample.expected_len() {
            return Err(CameraError::encoding(format!(
                "frame of {}x{} carries {} bytes",
                sample.width,
                sample.height,
                sample.data.len()
            )));
        }
        if sample.width == self.width && sample.height == self.height {
            return Ok(sample.data.to_vec());
        }
        let image = RgbImage::from_raw(sample.width, sample.height, sample.data.to_vec())
            .ok_or_else(|| CameraError::encoding("frame buffer does not match its size"))?;
        Ok(imageops::resize(&image, self.width, self.height, FilterType::Nearest).into_raw())
    }

    #[cfg(feature = "audio")]
    fn write_packets(&mut self, packets: Vec<AudioPacket>) -> Result<(), CameraError> {
        for packet in packets {
            let pts = self.timestamp(packet.pts);
            self.muxer
                .write_audio(pts, &packet.data)
                .map_err(|e| CameraError::encoding(format!("Failed to mux audio: {}", e)))?;
        }
        Ok(())
    }
}

impl ContainerWriter for Mp4Writer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn status(&self) -> WriterStatus {
        self.status
    }

    fn start_session(&mut self, anchor: Duration) -> Result<(), CameraError> {
        if self.status != WriterStatus::Unknown {
            return Err(CameraError::encoding("container timeline already started"));
        }
        self.anchor = anchor;
        self.status = WriterStatus::Writing;
        Ok(())
    }

    fn video_ready(&mut self) -> bool {
        self.status == WriterStatus::Writing
    }

    fn audio_ready(&mut self) -> bool {
        self.status == WriterStatus::Writing
    }

    fn append_video(&mut self, sample: &VideoSample) -> Result<(), CameraError> {
        let rgb = self.conform_frame(sample)?;
        let encoded = self.encoder.encode_rgb(&rgb)?;
        if encoded.data.is_empty() {
            self.skipped += 1;
            return Ok(());
        }

        let pts = self.timestamp(sample.pts);
        if let Err(e) = self.muxer.write_video(pts, &encoded.data, encoded.is_keyframe) {
            self.status = WriterStatus::Failed;
            return Err(CameraError::encoding(format!("Failed to mux video: {}", e)));
        }
        if sample.kind == FrameKind::Filler {
            self.filler_frames += 1;
        }
        Ok(())
    }

    #[cfg(feature = "audio")]
    fn append_audio(&mut self, sample: &AudioSample) -> Result<(), CameraError> {
        let Some(encoder) = self.audio.as_mut() else {
            return Ok(());
        };
        let chunk = conform(sample, encoder.sample_rate(), encoder.channels());
        let packets = encoder.encode(&chunk)?;
        self.write_packets(packets)?;
        self.audio_chunks += 1;
        Ok(())
    }

    #[cfg(not(feature = "audio"))]
    fn append_audio(&mut self, _sample: &AudioSample) -> Result<(), CameraError> {
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<RecordingSummary, CameraError> {
        #[allow(unused_mut)]
        let mut writer = *self;

        #[cfg(feature = "audio")]
        if let Some(mut encoder) = writer.audio.take() {
            let tail = encoder.flush()?;
            writer.write_packets(tail)?;
        }

        let stats = writer
            .muxer
            .finish_with_stats()
            .map_err(|e| CameraError::encoding(format!("Failed to finalize MP4: {}", e)))?;

        Ok(RecordingSummary {
            path: writer.path,
            video_frames: stats.video_frames as u64,
            filler_frames: writer.filler_frames,
            audio_chunks: writer.audio_chunks,
            dropped_samples: writer.skipped,
            duration_secs: stats.duration_secs,
            bytes_written: stats.bytes_written as u64,
        })
    }

    fn cancel(self: Box<Self>) {
        let path = self.path.clone();
        drop(self);
        discard_file(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::synthetic_video_sample;
    use crate::types::CameraPosition;

    #[test]
    fn test_writes_playable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let settings = WriterSettings::new(320, 240, 30.0).with_title("duocam test");
        let mut writer = Mp4WriterFactory::new().create(&path, &settings).unwrap();

        writer.start_session(Duration::from_millis(200)).unwrap();
        for i in 0..15u64 {
            let pts = Duration::from_millis(200 + i * 33);
            let frame = synthetic_video_sample(i, 320, 240, CameraPosition::Back, pts);
            writer.append_video(&frame).unwrap();
        }
        let summary = writer.finish().unwrap();

        assert_eq!(summary.video_frames, 15);
        assert!(summary.bytes_written > 0);
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_odd_sizes_are_scaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.mp4");
        let mut writer = Mp4WriterFactory::new()
            .create(&path, &WriterSettings::new(321, 241, 30.0))
            .unwrap();
        writer.start_session(Duration::ZERO).unwrap();

        let frame = synthetic_video_sample(0, 321, 241, CameraPosition::Front, Duration::ZERO);
        writer.append_video(&frame).unwrap();

        let mut broken = frame.clone();
        broken.data = vec![0u8; 10].into();
        assert!(writer.append_video(&broken).is_err());
        writer.cancel();
        assert!(!path.exists());
    }
}
