//! Camera engine facade
//!
//! [`CameraEngine`] is the public entry point. Session operations are jobs on
//! the `duocam-session` context and see each other in submission order.
//! Recording stop and cancel go straight to the recorder, so a caller can end a
//! recording while a session job is still running.

mod controller;
mod topology;

pub use controller::{clamp_zoom, zoom_levels, SessionController, SessionPhase, SessionStatus, ZOOM_PREFERENCES};
pub use topology::{AttachedCamera, DualCameraTopology, SingleCameraTopology, Topology};

use crate::config::DuocamConfig;
use crate::context::SerialContext;
use crate::device::DeviceCatalog;
use crate::errors::CameraError;
use crate::events::{EventHub, EventStream};
use crate::platform::{CaptureBackend, InputId};
use crate::recording::{default_writer_factory, RecordingEngine, WriterFactory};
use crate::types::CameraPosition;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct CameraEngine {
    session: SerialContext<SessionController>,
    recorder: Arc<RecordingEngine>,
    events: EventHub,
    config: DuocamConfig,
}

impl CameraEngine {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        factory: Arc<dyn WriterFactory>,
        config: DuocamConfig,
    ) -> Result<Self, CameraError> {
        config.validate().map_err(CameraError::InvalidArgument)?;

        let events = EventHub::new();
        let recorder = RecordingEngine::new(
            factory,
            config.recording.clone(),
            config.storage.output_dir(),
            events.sink(),
        )?;

        log::info!("Camera engine using the {} backend", backend.name());
        let controller =
            SessionController::new(DeviceCatalog::new(backend), config.clone(), recorder.clone());
        let timeout = Duration::from_millis(config.session.operation_timeout_ms);
        let session = SerialContext::spawn("duocam-session", controller, timeout)?;

        Ok(Self {
            session,
            recorder,
            events,
            config,
        })
    }

    /// Engine with the default writer and configuration
    pub fn with_backend(backend: Arc<dyn CaptureBackend>) -> Result<Self, CameraError> {
        Self::new(backend, default_writer_factory(), DuocamConfig::default())
    }

    fn call<R, F>(&self, job: F) -> Result<R, CameraError>
    where
        R: Send + 'static,
        F: FnOnce(&mut SessionController) -> Result<R, CameraError> + Send + 'static,
    {
        self.session.run(job).and_then(|result| result)
    }

    pub fn config(&self) -> &DuocamConfig {
        &self.config
    }

    /// Configure and start the capture session
    pub fn init(&self) -> Result<(), CameraError> {
        self.call(|session| session.ensure_configured())
    }

    /// Capture a JPEG into the output directory and return its path
    pub fn take_picture(&self) -> Result<PathBuf, CameraError> {
        let dir = self.config.storage.output_dir();
        self.call(move |session| {
            session.ensure_configured()?;
            session.capture_photo(dir)
        })
    }

    pub fn switch_camera(&self) -> Result<CameraPosition, CameraError> {
        self.call(|session| session.switch_camera())
    }

    pub fn set_flash(&self, on: bool) -> Result<(), CameraError> {
        self.call(move |session| {
            session.set_flash(on);
            Ok(())
        })
    }

    pub fn set_zoom(&self, factor: f64) -> Result<f64, CameraError> {
        if !factor.is_finite() {
            return Err(CameraError::InvalidArgument(format!("zoom factor {}", factor)));
        }
        self.call(move |session| session.set_zoom(factor))
    }

    pub fn set_brightness(&self, bias: f32) -> Result<f32, CameraError> {
        if !bias.is_finite() {
            return Err(CameraError::InvalidArgument(format!("exposure bias {}", bias)));
        }
        self.call(move |session| session.set_brightness(bias))
    }

    pub fn available_zoom_levels(&self) -> Result<Vec<f64>, CameraError> {
        self.session.run(|session| session.available_zoom_levels())
    }

    pub fn optimize_for_capture(&self) -> Result<usize, CameraError> {
        self.call(|session| session.optimize_for_capture())
    }

    pub fn pause(&self) -> Result<(), CameraError> {
        self.session.run(|session| session.pause())
    }

    pub fn resume(&self) -> Result<(), CameraError> {
        self.call(|session| session.resume())
    }

    /// Release every device; the engine can be initialized again afterwards
    pub fn dispose(&self) -> Result<(), CameraError> {
        self.session.run(|session| session.dispose())
    }

    /// Start recording, optionally finalizing by itself after `max_duration`
    pub fn start_recording(&self, max_duration: Option<Duration>) -> Result<PathBuf, CameraError> {
        self.call(move |session| {
            session.ensure_configured()?;
            session.start_recording(max_duration)
        })
    }

    /// Finalize the recording; `None` when nothing was written
    pub fn stop_recording(&self) -> Result<Option<PathBuf>, CameraError> {
        self.recorder.stop(false)
    }

    /// Discard the recording
    pub fn cancel_recording(&self) -> Result<(), CameraError> {
        self.recorder.stop(true).map(|_| ())
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn supports_live_switch(&self) -> Result<bool, CameraError> {
        self.session.run(|session| session.supports_live_switch())
    }

    pub fn status(&self) -> Result<SessionStatus, CameraError> {
        self.session.run(|session| session.status())
    }

    pub fn attached_inputs(&self) -> Result<Vec<InputId>, CameraError> {
        self.session.run(|session| session.attached_inputs())
    }

    /// Recording events; the stream can be taken once
    pub fn take_events(&self) -> Option<EventStream> {
        self.events.take_stream()
    }

    pub fn recorder(&self) -> &Arc<RecordingEngine> {
        &self.recorder
    }
}

impl Drop for CameraEngine {
    fn drop(&mut self) {
        if let Err(e) = self.session.run(|session| session.dispose()) {
            log::warn!("Camera engine dropped without dispose: {}", e);
        }
        self.session.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::TimelineWriterFactory;
    use crate::testing;

    fn engine(backend: crate::platform::SyntheticBackend, dir: &std::path::Path) -> CameraEngine {
        let mut config = DuocamConfig::default();
        config.storage.output_directory = dir.to_string_lossy().into_owned();
        CameraEngine::new(Arc::new(backend), Arc::new(TimelineWriterFactory::new()), config).unwrap()
    }

    #[test]
    fn test_take_picture_configures_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(testing::single_camera_phone(), dir.path());
        let path = engine.take_picture().unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(engine.status().unwrap().phase, SessionPhase::Running);
    }

    #[test]
    fn test_rejects_non_finite_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(testing::single_camera_phone(), dir.path());
        assert!(matches!(
            engine.set_zoom(f64::NAN),
            Err(CameraError::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.set_brightness(f32::INFINITY),
            Err(CameraError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_stop_without_recording() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(testing::single_camera_phone(), dir.path());
        assert!(matches!(engine.stop_recording(), Err(CameraError::NotRecording)));
        assert!(matches!(engine.cancel_recording(), Err(CameraError::NotRecording)));
    }

    #[test]
    fn test_event_stream_taken_once() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(testing::back_only_device(), dir.path());
        assert!(engine.take_events().is_some());
        assert!(engine.take_events().is_none());
    }
}
