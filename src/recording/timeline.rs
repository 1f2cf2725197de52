//! Dry-run container that records the accepted timeline
//!
//! `TimelineWriter` encodes nothing. It keeps every appended sample's rebased
//! timestamp and writes them as a JSON manifest on finish, which makes the
//! recording engine's ordering and bridging observable without a codec stack.

use super::config::{RecordingSummary, WriterSettings};
use super::writer::{discard_file, ContainerWriter, WriterFactory, WriterStatus};
use crate::errors::CameraError;
use crate::types::{AudioSample, CameraPosition, FrameKind, VideoSample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoEntry {
    pub pts_us: u64,
    pub source: CameraPosition,
    pub kind: FrameKind,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioEntry {
    pub pts_us: u64,
    pub frames: usize,
}

/// Manifest of one finished recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub path: PathBuf,
    pub settings: WriterSettings,
    pub created_at: DateTime<Utc>,
    /// Capture-clock time of the first accepted sample
    pub anchor_us: u64,
    pub video: Vec<VideoEntry>,
    pub audio: Vec<AudioEntry>,
}

impl Timeline {
    pub fn load(path: &Path) -> Result<Self, CameraError> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| CameraError::InvalidArgument(format!("Invalid timeline manifest: {}", e)))
    }

    pub fn video_timestamps(&self) -> Vec<Duration> {
        self.video
            .iter()
            .map(|v| Duration::from_micros(v.pts_us))
            .collect()
    }

    /// Strictly increasing video timestamps
    pub fn is_monotonic(&self) -> bool {
        self.video.windows(2).all(|w| w[1].pts_us > w[0].pts_us)
    }

    /// Largest distance between consecutive video frames
    pub fn max_video_gap(&self) -> Duration {
        self.video
            .windows(2)
            .map(|w| Duration::from_micros(w[1].pts_us.saturating_sub(w[0].pts_us)))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn filler_frames(&self) -> usize {
        self.video
            .iter()
            .filter(|v| v.kind == FrameKind::Filler)
            .count()
    }

    pub fn sources(&self) -> Vec<CameraPosition> {
        let mut sources: Vec<CameraPosition> = Vec::new();
        for entry in &self.video {
            if sources.last() != Some(&entry.source) {
                sources.push(entry.source);
            }
        }
        sources
    }

    pub fn duration(&self) -> Duration {
        self.video
            .last()
            .map(|v| Duration::from_micros(v.pts_us))
            .unwrap_or(Duration::ZERO)
    }
}

fn micros(duration: Duration) -> u64 {
    duration.as_micros().min(u64::MAX as u128) as u64
}

#[derive(Debug, Default)]
struct FactoryState {
    fail_create: AtomicBool,
    fail_finish: AtomicBool,
    unready_polls: AtomicU32,
    finish_delay_ms: AtomicU64,
    finished: Mutex<Vec<Timeline>>,
}

/// Factory producing [`TimelineWriter`]s; clones share injection flags and results
#[derive(Debug, Clone, Default)]
pub struct TimelineWriterFactory {
    state: Arc<FactoryState>,
}

impl TimelineWriterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next writer construction(s)
    pub fn set_fail_create(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_finish(&self, fail: bool) {
        self.state.fail_finish.store(fail, Ordering::SeqCst);
    }

    /// Writers sleep this long in `finish` before writing the manifest
    pub fn set_finish_delay(&self, delay: Duration) {
        self.state
            .finish_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Each new writer reports "not ready" for its first `polls` readiness checks
    pub fn set_unready_polls(&self, polls: u32) {
        self.state.unready_polls.store(polls, Ordering::SeqCst);
    }

    /// Timelines of every successfully finished writer, oldest first
    pub fn finished(&self) -> Vec<Timeline> {
        match self.state.finished.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last_finished(&self) -> Option<Timeline> {
        self.finished().pop()
    }
}

impl WriterFactory for TimelineWriterFactory {
    fn file_extension(&self) -> &str {
        "json"
    }

    fn create(
        &self,
        path: &Path,
        settings: &WriterSettings,
    ) -> Result<Box<dyn ContainerWriter>, CameraError> {
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(CameraError::writer_setup("timeline writer refused to open"));
        }
        File::create(path).map_err(|e| {
            CameraError::writer_setup(format!("Failed to create output file: {}", e))
        })?;

        Ok(Box::new(TimelineWriter {
            state: self.state.clone(),
            unready_polls: self.state.unready_polls.load(Ordering::SeqCst),
            status: WriterStatus::Unknown,
            timeline: Timeline {
                path: path.to_path_buf(),
                settings: settings.clone(),
                created_at: Utc::now(),
                anchor_us: 0,
                video: Vec::new(),
                audio: Vec::new(),
            },
            anchor: Duration::ZERO,
        }))
    }
}

pub struct TimelineWriter {
    state: Arc<FactoryState>,
    unready_polls: u32,
    status: WriterStatus,
    timeline: Timeline,
    anchor: Duration,
}

impl TimelineWriter {
    fn poll_ready(&mut self) -> bool {
        if self.unready_polls > 0 {
            self.unready_polls -= 1;
            return false;
        }
        self.status == WriterStatus::Writing
    }

    fn rebase(&self, pts: Duration) -> Result<Duration, CameraError> {
        pts.checked_sub(self.anchor).ok_or_else(|| {
            CameraError::encoding(format!("sample at {:?} precedes the anchor", pts))
        })
    }
}

impl ContainerWriter for TimelineWriter {
    fn path(&self) -> &Path {
        &self.timeline.path
    }

    fn status(&self) -> WriterStatus {
        self.status
    }

    fn start_session(&mut self, anchor: Duration) -> Result<(), CameraError> {
        if self.status != WriterStatus::Unknown {
            return Err(CameraError::encoding("timeline already started"));
        }
        self.anchor = anchor;
        self.timeline.anchor_us = micros(anchor);
        self.status = WriterStatus::Writing;
        Ok(())
    }

    fn video_ready(&mut self) -> bool {
        self.poll_ready()
    }

    fn audio_ready(&mut self) -> bool {
        self.status == WriterStatus::Writing
    }

    fn append_video(&mut self, sample: &VideoSample) -> Result<(), CameraError> {
        let pts = self.rebase(sample.pts)?;
        self.timeline.video.push(VideoEntry {
            pts_us: micros(pts),
            source: sample.source,
            kind: sample.kind,
            width: sample.width,
            height: sample.height,
        });
        Ok(())
    }

    fn append_audio(&mut self, sample: &AudioSample) -> Result<(), CameraError> {
        let pts = self.rebase(sample.pts)?;
        self.timeline.audio.push(AudioEntry {
            pts_us: micros(pts),
            frames: sample.samples.len() / sample.channels.max(1) as usize,
        });
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<RecordingSummary, CameraError> {
        let writer = *self;
        let delay = writer.state.finish_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if writer.state.fail_finish.load(Ordering::SeqCst) {
            discard_file(&writer.timeline.path);
            return Err(CameraError::encoding("timeline finalization failed"));
        }

        let json = serde_json::to_string_pretty(&writer.timeline)
            .map_err(|e| CameraError::encoding(format!("Failed to serialize timeline: {}", e)))?;
        fs::write(&writer.timeline.path, &json)?;

        let timeline = writer.timeline;
        let summary = RecordingSummary {
            path: timeline.path.clone(),
            video_frames: timeline.video.len() as u64,
            filler_frames: timeline.filler_frames() as u64,
            audio_chunks: timeline.audio.len() as u64,
            dropped_samples: 0,
            duration_secs: timeline.duration().as_secs_f64(),
            bytes_written: json.len() as u64,
        };

        match writer.state.finished.lock() {
            Ok(mut guard) => guard.push(timeline),
            Err(poisoned) => poisoned.into_inner().push(timeline),
        }
        Ok(summary)
    }

    fn cancel(self: Box<Self>) {
        discard_file(&self.timeline.path);
    }
}
