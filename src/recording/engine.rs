//! Recording engine
//!
//! At most one recording exists at a time. The engine moves through
//! Idle -> Preparing -> Writing -> Finishing -> Idle:
//!
//! - `start` creates the writer and arms the optional deadline (Preparing)
//! - the first delivered video or audio sample anchors the container (Writing)
//! - `stop` takes the recording out of the engine (Finishing), finalizes or
//!   discards it on the writer context, and always returns to Idle
//!
//! Delivery threads call in concurrently through [`SampleSink`]; samples
//! from the inactive camera are discarded before any lock is taken.

use super::bridge::{filler_timestamps, FillerFrame};
use super::config::{RecordingSummary, WriterSettings};
use super::writer::{discard_file, ContainerWriter, WriterFactory, WriterStatus};
use crate::config::RecordingConfig;
use crate::context::SerialContext;
use crate::errors::CameraError;
use crate::events::{EngineEvent, EventSink};
use crate::platform::SampleSink;
use crate::types::{AudioSample, CameraPosition, FrameKind, VideoSample};
use crossbeam_channel::{RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecorderPhase {
    Idle,
    Preparing,
    Writing,
    Finishing,
}

impl RecorderPhase {
    pub fn is_active(self) -> bool {
        matches!(self, RecorderPhase::Preparing | RecorderPhase::Writing)
    }
}

/// Bounded readiness polling
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    fn from_config(config: &RecordingConfig) -> Self {
        Self {
            attempts: config.append_retry_attempts.max(1),
            backoff: Duration::from_millis(config.append_retry_backoff_ms),
        }
    }

    fn wait(&self, mut ready: impl FnMut() -> bool) -> bool {
        for attempt in 0..self.attempts {
            if ready() {
                return true;
            }
            if attempt + 1 < self.attempts {
                thread::sleep(self.backoff);
            }
        }
        false
    }
}

/// One-shot timer that stops the recording of its generation.
/// Dropping it disarms the timer.
struct DeadlineTimer {
    _cancel: Sender<()>,
}

impl DeadlineTimer {
    fn arm(
        engine: Weak<RecordingEngine>,
        generation: u64,
        after: Duration,
    ) -> Result<Self, CameraError> {
        let (cancel, cancelled) = crossbeam_channel::bounded::<()>(0);
        thread::Builder::new()
            .name("duocam-deadline".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(after) {
                    if let Some(engine) = engine.upgrade() {
                        engine.expire(generation);
                    }
                }
            })?;
        Ok(Self { _cancel: cancel })
    }
}

struct RecordingSession {
    generation: u64,
    path: PathBuf,
    writer: Box<dyn ContainerWriter>,
    settings: WriterSettings,
    filler: FillerFrame,
    anchor: Option<Duration>,
    last_video_pts: Option<Duration>,
    last_audio_pts: Option<Duration>,
    video_accepted: u64,
    dropped: u64,
    deadline: Option<DeadlineTimer>,
}

impl RecordingSession {
    fn begin(&mut self, anchor: Duration) -> Result<(), CameraError> {
        self.writer.start_session(anchor)?;
        self.anchor = Some(anchor);
        log::info!("Recording timeline anchored at {:?}", anchor);
        Ok(())
    }

    fn push_video(&mut self, sample: &VideoSample, retry: RetryPolicy) -> bool {
        let Some(anchor) = self.anchor else {
            return false;
        };
        let stale = self
            .last_video_pts
            .map_or(false, |last| sample.pts <= last);
        if sample.pts < anchor || stale {
            self.dropped += 1;
            log::debug!("Dropping out-of-order video sample at {:?}", sample.pts);
            return false;
        }

        let writer = &mut self.writer;
        if !retry.wait(|| writer.video_ready()) {
            self.dropped += 1;
            log::debug!("Video input not ready, dropping sample at {:?}", sample.pts);
            return false;
        }

        match self.writer.append_video(sample) {
            Ok(()) => {
                self.last_video_pts = Some(sample.pts);
                self.video_accepted += 1;
                true
            }
            Err(e) => {
                self.dropped += 1;
                log::warn!("Video append failed: {}", e);
                false
            }
        }
    }

    fn push_audio(&mut self, sample: &AudioSample, retry: RetryPolicy) {
        let Some(anchor) = self.anchor else {
            return;
        };
        // Video anchors the timeline; audio waits for the first frame.
        if self.video_accepted == 0 || self.writer.status() != WriterStatus::Writing {
            return;
        }
        let stale = self
            .last_audio_pts
            .map_or(false, |last| sample.pts <= last);
        if sample.pts < anchor || stale {
            self.dropped += 1;
            return;
        }

        let writer = &mut self.writer;
        if !retry.wait(|| writer.audio_ready()) {
            self.dropped += 1;
            log::debug!("Audio input not ready, dropping chunk at {:?}", sample.pts);
            return;
        }
        match self.writer.append_audio(sample) {
            Ok(()) => self.last_audio_pts = Some(sample.pts),
            Err(e) => {
                self.dropped += 1;
                log::warn!("Audio append failed: {}", e);
            }
        }
    }
}

struct EngineInner {
    phase: RecorderPhase,
    session: Option<RecordingSession>,
    generation: u64,
    /// Set by `abort` while a finalize is in flight; its output is discarded
    discard_finishing: bool,
}

pub struct RecordingEngine {
    inner: Mutex<EngineInner>,
    active: AtomicU8,
    factory: Arc<dyn WriterFactory>,
    config: RecordingConfig,
    retry: RetryPolicy,
    output_dir: PathBuf,
    events: EventSink,
    writer_context: SerialContext<()>,
    last_summary: Mutex<Option<RecordingSummary>>,
    this: Weak<RecordingEngine>,
}

impl RecordingEngine {
    pub fn new(
        factory: Arc<dyn WriterFactory>,
        config: RecordingConfig,
        output_dir: PathBuf,
        events: EventSink,
    ) -> Result<Arc<Self>, CameraError> {
        let writer_context =
            SerialContext::spawn("duocam-writer", (), config.finalize_timeout())?;
        let retry = RetryPolicy::from_config(&config);

        Ok(Arc::new_cyclic(|this| Self {
            inner: Mutex::new(EngineInner {
                phase: RecorderPhase::Idle,
                session: None,
                generation: 0,
                discard_finishing: false,
            }),
            active: AtomicU8::new(CameraPosition::Back.to_u8()),
            factory,
            config,
            retry,
            output_dir,
            events,
            writer_context,
            last_summary: Mutex::new(None),
            this: this.clone(),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> RecorderPhase {
        self.lock().phase
    }

    pub fn is_recording(&self) -> bool {
        self.phase().is_active()
    }

    /// Position whose frames reach the writer
    pub fn active_position(&self) -> CameraPosition {
        CameraPosition::from_u8(self.active.load(Ordering::SeqCst))
    }

    pub fn set_active_position(&self, position: CameraPosition) {
        self.active.store(position.to_u8(), Ordering::SeqCst);
    }

    /// Summary of the most recent successful finalize
    pub fn last_summary(&self) -> Option<RecordingSummary> {
        match self.last_summary.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Begin a recording; the container starts on the first delivered sample
    pub fn start(
        &self,
        settings: WriterSettings,
        max_duration: Option<Duration>,
    ) -> Result<PathBuf, CameraError> {
        let mut inner = self.lock();
        if inner.phase != RecorderPhase::Idle {
            return Err(CameraError::AlreadyRecording);
        }

        fs::create_dir_all(&self.output_dir).map_err(|e| {
            CameraError::writer_setup(format!("Output directory unavailable: {}", e))
        })?;
        let path = self.output_dir.join(format!(
            "{}.{}",
            Uuid::new_v4(),
            self.factory.file_extension()
        ));

        let writer = self
            .factory
            .create(&path, &settings)
            .map_err(|e| match e {
                CameraError::WriterSetupFailed(_) => e,
                other => CameraError::writer_setup(other.to_string()),
            })?;

        let generation = inner.generation + 1;
        let deadline = match max_duration {
            Some(limit) => match DeadlineTimer::arm(self.this.clone(), generation, limit) {
                Ok(timer) => Some(timer),
                Err(e) => {
                    writer.cancel();
                    return Err(CameraError::writer_setup(format!(
                        "Failed to arm recording deadline: {}",
                        e
                    )));
                }
            },
            None => None,
        };
        inner.generation = generation;

        log::info!(
            "Recording prepared: {:?} ({}x{}@{}fps, limit {:?})",
            path,
            settings.width,
            settings.height,
            settings.fps,
            max_duration
        );

        let filler = FillerFrame::new(settings.width, settings.height);
        inner.session = Some(RecordingSession {
            generation,
            path: path.clone(),
            writer,
            settings,
            filler,
            anchor: None,
            last_video_pts: None,
            last_audio_pts: None,
            video_accepted: 0,
            dropped: 0,
            deadline,
        });
        inner.phase = RecorderPhase::Preparing;
        Ok(path)
    }

    pub fn append_video(&self, sample: VideoSample) {
        if sample.kind == FrameKind::Captured && sample.source != self.active_position() {
            return;
        }

        let mut guard = self.lock();
        let inner = &mut *guard;
        if !inner.phase.is_active() {
            return;
        }
        let Some(session) = inner.session.as_mut() else {
            return;
        };
        if session.anchor.is_none() {
            if let Err(e) = session.begin(sample.pts) {
                log::warn!("Failed to start container: {}", e);
                return;
            }
            inner.phase = RecorderPhase::Writing;
        }
        session.push_video(&sample, self.retry);
    }

    pub fn append_audio(&self, sample: AudioSample) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if !inner.phase.is_active() {
            return;
        }
        let Some(session) = inner.session.as_mut() else {
            return;
        };
        if session.anchor.is_none() {
            if let Err(e) = session.begin(sample.pts) {
                log::warn!("Failed to start container: {}", e);
                return;
            }
            inner.phase = RecorderPhase::Writing;
        }
        session.push_audio(&sample, self.retry);
    }

    /// Fill the gap of a single-camera input swap; returns the frames written
    pub fn bridge_switch(&self, incoming: CameraPosition) -> usize {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.phase != RecorderPhase::Writing {
            return 0;
        }
        let Some(session) = inner.session.as_mut() else {
            return 0;
        };
        let Some(last) = session.last_video_pts else {
            return 0;
        };

        let stamps = filler_timestamps(
            last,
            self.config.bridge_window(),
            session.settings.frame_duration(),
        );
        let mut written = 0;
        for pts in stamps {
            let sample = session.filler.sample(incoming, pts);
            if session.push_video(&sample, self.retry) {
                written += 1;
            }
        }
        log::info!(
            "Bridged camera switch with {} filler frames after {:?}",
            written,
            last
        );
        written
    }

    /// Stop the recording. `cancel` discards the file.
    ///
    /// Returns the output path, or `None` when the recording was discarded.
    pub fn stop(&self, cancel: bool) -> Result<Option<PathBuf>, CameraError> {
        self.finish_recording(cancel, None)
    }

    fn expire(&self, generation: u64) {
        log::info!("Recording deadline reached");
        match self.finish_recording(false, Some(generation)) {
            Ok(_) | Err(CameraError::NotRecording) => {}
            Err(e) => log::warn!("Deadline finalize failed: {}", e),
        }
    }

    fn finish_recording(
        &self,
        cancel: bool,
        generation: Option<u64>,
    ) -> Result<Option<PathBuf>, CameraError> {
        let mut session = {
            let mut inner = self.lock();
            if !inner.phase.is_active() {
                return Err(CameraError::NotRecording);
            }
            if let Some(expected) = generation {
                if inner.session.as_ref().map(|s| s.generation) != Some(expected) {
                    return Err(CameraError::NotRecording);
                }
            }
            let session = inner.session.take().ok_or(CameraError::NotRecording)?;
            inner.phase = RecorderPhase::Finishing;
            inner.discard_finishing = false;
            session
        };
        session.deadline.take();

        let outcome = self.complete(session, cancel);
        self.lock().phase = RecorderPhase::Idle;
        outcome
    }

    fn complete(
        &self,
        session: RecordingSession,
        cancel: bool,
    ) -> Result<Option<PathBuf>, CameraError> {
        let RecordingSession {
            writer,
            path,
            anchor,
            dropped,
            ..
        } = session;

        if cancel || anchor.is_none() {
            log::info!(
                "Discarding recording {:?} ({})",
                path,
                if cancel { "cancelled" } else { "no samples" }
            );
            if let Err(e) = self.writer_context.run(move |_| writer.cancel()) {
                log::warn!("Discard did not complete: {}", e);
            }
            return Ok(None);
        }

        let finished = self.writer_context.run(move |_| writer.finish()).and_then(|r| r);
        if std::mem::take(&mut self.lock().discard_finishing) {
            log::info!("Discarding finalized recording {:?} (disposed)", path);
            discard_file(&path);
            return Ok(None);
        }

        match finished {
            Ok(mut summary) => {
                summary.dropped_samples += dropped;
                log::info!(
                    "Recording finished: {:?} ({} frames, {} filler, {} dropped, {:.2}s)",
                    path,
                    summary.video_frames,
                    summary.filler_frames,
                    summary.dropped_samples,
                    summary.duration_secs
                );
                match self.last_summary.lock() {
                    Ok(mut guard) => *guard = Some(summary),
                    Err(poisoned) => *poisoned.into_inner() = Some(summary),
                }
                self.events.emit(EngineEvent::VideoRecorded { path: path.clone() });
                Ok(Some(path))
            }
            Err(e) => {
                log::error!("Recording finalize failed: {}", e);
                discard_file(&path);
                self.events.emit(EngineEvent::VideoError {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Drop any active recording without blocking; its file is removed on the writer context.
    /// A finalize already in flight completes and then discards its output.
    pub fn abort(&self) {
        let session = {
            let mut inner = self.lock();
            if inner.phase == RecorderPhase::Finishing {
                log::info!("Recording finalize in flight; output will be discarded");
                inner.discard_finishing = true;
                return;
            }
            if !inner.phase.is_active() {
                return;
            }
            inner.phase = RecorderPhase::Idle;
            inner.session.take()
        };
        if let Some(session) = session {
            let writer = session.writer;
            log::info!("Aborting recording {:?}", session.path);
            if let Err(e) = self.writer_context.post(move |_| writer.cancel()) {
                log::warn!("Failed to schedule discard: {}", e);
            }
        }
    }
}

impl SampleSink for RecordingEngine {
    fn on_video(&self, sample: VideoSample) {
        self.append_video(sample);
    }

    fn on_audio(&self, sample: AudioSample) {
        self.append_audio(sample);
    }
}
