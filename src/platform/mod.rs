//! Hardware interface of the capture engine
//!
//! Everything the engine needs from camera hardware goes through the traits in
//! this module. A [`CaptureBackend`] answers capability queries and builds a
//! [`CaptureGraph`]; the graph holds the inputs and outputs of one session and
//! hands out [`DeviceLock`] guards for device configuration. Samples flow back
//! through a [`SampleSink`] on the backend's own delivery threads.
//!
//! Backends:
//! - [`synthetic`]: deterministic virtual devices, always available
//! - `native` (feature `native`): desktop cameras through nokhwa

pub mod synthetic;

#[cfg(feature = "native")]
pub mod native;

use crate::errors::CameraError;
use crate::types::{
    AudioSample, CameraPosition, ConnectionSettings, DeviceDescriptor, DeviceKind, ExposureMode,
    FlashMode, FocusMode, SessionTopology, VideoSample, WhiteBalanceMode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use synthetic::{SyntheticBackend, SyntheticInspector};

/// Raw failure reported by a backend.
///
/// Never returned from the public engine API; the session controller maps it
/// to a [`CameraError`] kind at the operation boundary.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        PlatformError(message.into())
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Handle of one video input attached to a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputKind {
    Photo,
    VideoData,
    AudioData,
}

/// Live configuration of an attached device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub format_index: usize,
    pub frame_rate: f64,
    pub zoom_factor: f64,
    pub exposure_bias: f32,
    pub focus_mode: Option<FocusMode>,
    pub exposure_mode: Option<ExposureMode>,
    pub white_balance_mode: Option<WhiteBalanceMode>,
    pub smooth_autofocus: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            format_index: 0,
            frame_rate: 30.0,
            zoom_factor: 1.0,
            exposure_bias: 0.0,
            focus_mode: None,
            exposure_mode: None,
            white_balance_mode: None,
            smooth_autofocus: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSettings {
    pub flash: FlashMode,
    pub quality: u8,
}

/// Receiver of live samples. Called concurrently from every delivery thread.
pub trait SampleSink: Send + Sync {
    fn on_video(&self, sample: VideoSample);
    fn on_audio(&self, sample: AudioSample);
}

/// Capability queries and session construction for one kind of hardware
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Connected devices at `position` whose kind is one of `kinds`, in `kinds` order
    fn discover(&self, position: CameraPosition, kinds: &[DeviceKind]) -> Vec<DeviceDescriptor>;

    /// The system default camera at `position`, whatever its kind
    fn default_device(&self, position: CameraPosition) -> Option<DeviceDescriptor>;

    fn is_connected(&self, device_id: &str) -> bool;

    /// Whether two cameras can stream at the same time
    fn supports_multi_cam(&self) -> bool;

    fn has_microphone(&self) -> bool;

    fn create_session(&self, topology: SessionTopology) -> PlatformResult<Box<dyn CaptureGraph>>;
}

/// One capture session: inputs, outputs and the running flag
pub trait CaptureGraph: Send {
    fn topology(&self) -> SessionTopology;

    /// Batch the following input/output changes
    fn begin_configuration(&mut self);
    fn commit_configuration(&mut self);

    fn can_add_input(&self, device: &DeviceDescriptor) -> bool;
    fn add_input(&mut self, device: &DeviceDescriptor) -> PlatformResult<InputId>;
    fn remove_input(&mut self, input: InputId);
    fn add_audio_input(&mut self) -> PlatformResult<()>;
    fn inputs(&self) -> Vec<InputId>;

    fn add_output(&mut self, kind: OutputKind) -> PlatformResult<()>;
    fn outputs(&self) -> Vec<OutputKind>;

    /// Detach every input and output
    fn remove_all(&mut self);

    /// Install the receiver for the data outputs; `None` stops delivery
    fn set_sample_sink(&mut self, sink: Option<Arc<dyn SampleSink>>);

    fn start_running(&mut self) -> PlatformResult<()>;
    fn stop_running(&mut self);
    fn is_running(&self) -> bool;

    /// Exclusive configuration access to an attached device; released on drop
    fn lock_device(&mut self, device_id: &str) -> PlatformResult<Box<dyn DeviceLock + '_>>;
    fn device_state(&self, device_id: &str) -> Option<DeviceState>;

    fn has_video_connection(&self, output: OutputKind) -> bool;
    fn supported_flash_modes(&self) -> Vec<FlashMode>;

    /// Capture a still from the camera at `position`, JPEG encoded
    fn capture_photo(
        &mut self,
        position: CameraPosition,
        settings: &PhotoSettings,
    ) -> PlatformResult<Vec<u8>>;

    /// Configure the photo and video data connections fed by the camera at `position`
    fn set_connection_settings(&mut self, position: CameraPosition, settings: ConnectionSettings);
    fn clear_connection_settings(&mut self, position: CameraPosition);
    fn connection_settings(&self, position: CameraPosition) -> Option<ConnectionSettings>;

    fn is_mirrored(&self, position: CameraPosition) -> bool {
        self.connection_settings(position)
            .map_or(false, |settings| settings.mirrored)
    }
}

/// Held configuration lock of one device
pub trait DeviceLock {
    fn set_active_format(&mut self, index: usize) -> PlatformResult<()>;
    fn set_frame_rate(&mut self, fps: f64) -> PlatformResult<()>;
    fn set_zoom_factor(&mut self, factor: f64);
    /// Move towards `factor` at `rate` doublings per second
    fn ramp_zoom(&mut self, factor: f64, rate: f64);
    fn set_exposure_bias(&mut self, bias: f32);
    fn set_focus_mode(&mut self, mode: FocusMode);
    fn set_exposure_mode(&mut self, mode: ExposureMode);
    fn set_white_balance_mode(&mut self, mode: WhiteBalanceMode);
    fn set_smooth_autofocus(&mut self, enabled: bool);
}

/// Native cameras with feature `native`, otherwise a synthetic two-camera phone
pub fn default_backend() -> Result<Arc<dyn CaptureBackend>, CameraError> {
    #[cfg(feature = "native")]
    {
        let backend = native::NativeBackend::new().map_err(|e| configuration_error("camera backend", e))?;
        Ok(Arc::new(backend))
    }
    #[cfg(not(feature = "native"))]
    {
        Ok(Arc::new(crate::testing::single_camera_phone()))
    }
}

/// Translate a backend failure into a configuration failure
pub(crate) fn configuration_error(context: &str, err: PlatformError) -> CameraError {
    CameraError::configuration(format!("{}: {}", context, err))
}
