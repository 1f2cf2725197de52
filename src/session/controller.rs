//! Capture session state machine
//!
//! The controller owns the capture graph, the device catalog and the chosen
//! topology. It lives by value on the session context, so every method here
//! runs serialized with every other one.

use super::topology::{AttachedCamera, DualCameraTopology, SingleCameraTopology, Topology};
use crate::config::DuocamConfig;
use crate::device::{apply_format, select_dual, select_single, DeviceCatalog, FormatChoice};
use crate::errors::CameraError;
use crate::platform::{
    configuration_error, CaptureGraph, DeviceState, InputId, OutputKind, PhotoSettings,
    SampleSink,
};
use crate::recording::{RecorderPhase, RecordingEngine, WriterSettings};
use crate::types::{
    CameraPosition, ConnectionSettings, DeviceDescriptor, ExposureMode, FlashMode, FocusMode,
    LiveSwitchPolicy, SessionTopology, WhiteBalanceMode,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Zoom factors offered to the user when the device range allows them
pub const ZOOM_PREFERENCES: [f64; 5] = [0.5, 1.0, 2.0, 3.0, 5.0];
const MAX_ZOOM_LEVELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Unconfigured,
    Configuring,
    Running,
    Paused,
}

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub topology: Option<SessionTopology>,
    pub active_position: Option<CameraPosition>,
    pub active_device: Option<String>,
    pub recording: RecorderPhase,
    pub flash_on: bool,
    pub device_state: Option<DeviceState>,
}

/// Zoom levels for a device range: preferred factors inside it plus its minimum
pub fn zoom_levels(min: f64, max: f64) -> Vec<f64> {
    let mut levels: Vec<f64> = ZOOM_PREFERENCES
        .iter()
        .copied()
        .filter(|z| *z >= min && *z <= max)
        .collect();
    levels.push(min);
    levels.sort_by(|a, b| a.total_cmp(b));
    levels.dedup_by(|a, b| (*a - *b).abs() < 1e-6);
    levels.truncate(MAX_ZOOM_LEVELS);
    levels
}

/// Requested zoom clamped to `[1.0, max]`
pub fn clamp_zoom(factor: f64, max: f64) -> f64 {
    factor.max(1.0).min(max.max(1.0))
}

pub struct SessionController {
    catalog: DeviceCatalog,
    config: DuocamConfig,
    recorder: Arc<RecordingEngine>,
    graph: Option<Box<dyn CaptureGraph>>,
    topology: Option<Topology>,
    phase: SessionPhase,
    flash_on: bool,
}

impl SessionController {
    pub fn new(catalog: DeviceCatalog, config: DuocamConfig, recorder: Arc<RecordingEngine>) -> Self {
        Self {
            catalog,
            config,
            recorder,
            graph: None,
            topology: None,
            phase: SessionPhase::Unconfigured,
            flash_on: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    /// Inputs currently attached to the capture graph
    pub fn attached_inputs(&self) -> Vec<InputId> {
        self.graph.as_ref().map(|g| g.inputs()).unwrap_or_default()
    }

    pub fn status(&self) -> SessionStatus {
        let active = self.topology.as_ref().map(|t| t.active_camera());
        SessionStatus {
            phase: self.phase,
            topology: self.topology.as_ref().map(Topology::kind),
            active_position: self.topology.as_ref().map(Topology::active_position),
            active_device: active.map(|c| c.device.id.clone()),
            recording: self.recorder.phase(),
            flash_on: self.flash_on,
            device_state: active.and_then(|c| self.device_state(&c.device.id)),
        }
    }

    fn device_state(&self, device_id: &str) -> Option<DeviceState> {
        self.graph.as_ref().and_then(|g| g.device_state(device_id))
    }

    fn parts(&mut self) -> Result<(&mut dyn CaptureGraph, &mut Topology), CameraError> {
        match (self.graph.as_mut(), self.topology.as_mut()) {
            (Some(graph), Some(topology)) => Ok((graph.as_mut(), topology)),
            _ => Err(CameraError::configuration("camera session is not configured")),
        }
    }

    /// Active device descriptor and its live state
    fn active_device(&self) -> Result<(DeviceDescriptor, DeviceState), CameraError> {
        let camera = self
            .topology
            .as_ref()
            .map(|t| t.active_camera())
            .ok_or(CameraError::DeviceUnavailable)?;
        let state = self
            .device_state(&camera.device.id)
            .ok_or(CameraError::DeviceUnavailable)?;
        Ok((camera.device.clone(), state))
    }

    /// Configure and start the session unless it already is
    pub fn ensure_configured(&mut self) -> Result<(), CameraError> {
        match self.phase {
            SessionPhase::Running => return Ok(()),
            SessionPhase::Paused if self.graph.is_some() && self.topology.is_some() => {
                if let Some(graph) = self.graph.as_mut() {
                    graph
                        .start_running()
                        .map_err(|e| configuration_error("restart session", e))?;
                }
                self.phase = SessionPhase::Running;
                log::info!("Camera session resumed");
                return Ok(());
            }
            _ => {}
        }

        self.phase = SessionPhase::Configuring;
        match self.configure() {
            Ok(()) => {
                self.phase = SessionPhase::Running;
                Ok(())
            }
            Err(e) => {
                log::warn!("Camera configuration failed: {}", e);
                self.teardown();
                Err(e)
            }
        }
    }

    fn configure(&mut self) -> Result<(), CameraError> {
        let backend = self.catalog.backend().clone();
        let preferred = self.config.session.preferred_position;

        if self.config.session.allow_dual_camera && backend.supports_multi_cam() {
            match (
                self.catalog.find_device(CameraPosition::Back),
                self.catalog.find_device(CameraPosition::Front),
            ) {
                (Ok(back), Ok(front)) => return self.configure_dual(back, front, preferred),
                _ => log::warn!("Multi-camera hardware lacks a second camera, using one"),
            }
        }

        let device = self
            .catalog
            .find_device(preferred)
            .or_else(|_| self.catalog.find_device(preferred.opposite()))?;
        self.configure_single(device)
    }

    fn configure_single(&mut self, device: DeviceDescriptor) -> Result<(), CameraError> {
        let backend = self.catalog.backend().clone();
        let mut graph = backend
            .create_session(SessionTopology::SingleCamera)
            .map_err(|e| configuration_error("create session", e))?;

        graph.begin_configuration();
        let attached = attach_camera(graph.as_mut(), &device);
        let attached = attached.and_then(|input| {
            attach_outputs(graph.as_mut(), backend.has_microphone())?;
            Ok(input)
        });
        let format = match &attached {
            Ok(_) => self.configure_device(graph.as_mut(), &device, None),
            Err(_) => None,
        };
        graph.commit_configuration();
        // A graph dropped on this path releases whatever was attached.
        let input = attached?;

        self.start_graph(graph.as_mut())?;
        self.recorder.set_active_position(device.position);
        log::info!(
            "Single-camera session running on {} ({})",
            device.name,
            device.position.as_str()
        );

        self.topology = Some(Topology::Single(SingleCameraTopology {
            camera: AttachedCamera { input, device },
            format,
        }));
        self.graph = Some(graph);
        Ok(())
    }

    fn configure_dual(
        &mut self,
        back: DeviceDescriptor,
        front: DeviceDescriptor,
        active: CameraPosition,
    ) -> Result<(), CameraError> {
        let backend = self.catalog.backend().clone();
        let mut graph = backend
            .create_session(SessionTopology::DualCamera)
            .map_err(|e| configuration_error("create dual session", e))?;

        graph.begin_configuration();
        let inputs = attach_camera(graph.as_mut(), &back).and_then(|back_input| {
            let front_input = attach_camera(graph.as_mut(), &front)?;
            attach_outputs(graph.as_mut(), backend.has_microphone())?;
            Ok((back_input, front_input))
        });

        let format = match &inputs {
            Ok(_) => {
                let choice = select_dual(&back, &front);
                match &choice {
                    Some(choice) => {
                        if !choice.matched {
                            log::warn!("Cameras share no format, recording at baseline {}", choice.output);
                        }
                        for (device, side) in [(&back, &choice.back), (&front, &choice.front)] {
                            if let Err(e) = apply_format(graph.as_mut(), &device.id, side) {
                                log::warn!("Keeping default format on {}: {}", device.name, e);
                            }
                        }
                    }
                    None => log::warn!("No usable dual-camera format, keeping device defaults"),
                }
                for device in [&back, &front] {
                    self.apply_preferred(graph.as_mut(), device, None);
                    graph.set_connection_settings(device.position, ConnectionSettings::for_device(device));
                }
                choice
            }
            Err(_) => None,
        };
        graph.commit_configuration();
        let (back_input, front_input) = inputs?;

        self.start_graph(graph.as_mut())?;
        self.recorder.set_active_position(active);
        log::info!("Dual-camera session running, {} active", active.as_str());

        self.topology = Some(Topology::Dual(DualCameraTopology {
            back: AttachedCamera {
                input: back_input,
                device: back,
            },
            front: AttachedCamera {
                input: front_input,
                device: front,
            },
            active,
            format,
        }));
        self.graph = Some(graph);
        Ok(())
    }

    fn start_graph(&self, graph: &mut dyn CaptureGraph) -> Result<(), CameraError> {
        let sink: Arc<dyn SampleSink> = self.recorder.clone();
        graph.set_sample_sink(Some(sink));
        graph
            .start_running()
            .map_err(|e| configuration_error("start session", e))
    }

    /// Negotiate and apply a format, then the preferred device settings
    fn configure_device(
        &self,
        graph: &mut dyn CaptureGraph,
        device: &DeviceDescriptor,
        zoom: Option<f64>,
    ) -> Option<FormatChoice> {
        let choice = select_single(device);
        match &choice {
            Some(choice) => {
                if let Err(e) = apply_format(graph, &device.id, choice) {
                    log::warn!("Keeping default format on {}: {}", device.name, e);
                }
            }
            None => log::warn!("{} offers no format at 15 fps or more", device.name),
        }
        self.apply_preferred(graph, device, zoom);
        graph.set_connection_settings(device.position, ConnectionSettings::for_device(device));
        choice
    }

    /// Smooth autofocus, continuous focus and exposure, carried-over zoom
    fn apply_preferred(&self, graph: &mut dyn CaptureGraph, device: &DeviceDescriptor, zoom: Option<f64>) {
        let format_index = graph
            .device_state(&device.id)
            .map(|s| s.format_index)
            .unwrap_or(0);
        let (min_zoom, max_zoom) = device.zoom_range(format_index);

        let mut lock = match graph.lock_device(&device.id) {
            Ok(lock) => lock,
            Err(e) => {
                log::warn!("Skipping preferred configuration of {}: {}", device.name, e);
                return;
            }
        };
        let caps = &device.capabilities;
        if caps.smooth_autofocus {
            lock.set_smooth_autofocus(true);
        }
        if caps.supports_focus(FocusMode::ContinuousAutoFocus) {
            lock.set_focus_mode(FocusMode::ContinuousAutoFocus);
        }
        if caps.supports_exposure(ExposureMode::ContinuousAutoExposure) {
            lock.set_exposure_mode(ExposureMode::ContinuousAutoExposure);
        }
        if let Some(zoom) = zoom {
            lock.set_zoom_factor(zoom.clamp(min_zoom, max_zoom));
        }
    }

    pub fn pause(&mut self) {
        if self.phase == SessionPhase::Running {
            if let Some(graph) = self.graph.as_mut() {
                graph.stop_running();
            }
            self.phase = SessionPhase::Paused;
            log::info!("Camera session paused");
        }
    }

    pub fn resume(&mut self) -> Result<(), CameraError> {
        self.ensure_configured()
    }

    fn teardown(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.set_sample_sink(None);
            graph.stop_running();
            graph.remove_all();
        }
        self.topology = None;
        self.catalog.clear();
        self.phase = SessionPhase::Unconfigured;
    }

    /// Release all hardware; safe to repeat
    pub fn dispose(&mut self) {
        self.recorder.abort();
        if self.graph.is_some() {
            log::info!("Disposing camera session");
        }
        self.teardown();
    }

    pub fn capture_photo(&mut self, output_dir: PathBuf) -> Result<PathBuf, CameraError> {
        if self.phase != SessionPhase::Running {
            return Err(CameraError::configuration("camera session is not running"));
        }
        let flash_on = self.flash_on;
        let quality = self.config.storage.jpeg_quality;
        let (graph, topology) = self.parts()?;
        if !graph.has_video_connection(OutputKind::Photo) {
            return Err(CameraError::configuration("photo output has no video connection"));
        }

        let requested = if flash_on { FlashMode::On } else { FlashMode::Off };
        let flash = if graph.supported_flash_modes().contains(&requested) {
            requested
        } else {
            log::debug!("Flash {:?} unsupported by the photo output, capturing with Off", requested);
            FlashMode::Off
        };

        let position = topology.active_position();
        let jpeg = graph
            .capture_photo(position, &PhotoSettings { flash, quality })
            .map_err(|e| CameraError::capture(e.to_string()))?;
        if jpeg.is_empty() {
            return Err(CameraError::capture("photo contained no image data"));
        }

        fs::create_dir_all(&output_dir)?;
        let path = output_dir.join(format!("{}.jpg", Uuid::new_v4()));
        fs::write(&path, &jpeg)?;
        log::info!("Photo saved to {:?} ({} bytes)", path, jpeg.len());
        Ok(path)
    }

    pub fn switch_camera(&mut self) -> Result<CameraPosition, CameraError> {
        let recording = self.recorder.is_recording();
        let policy = self.config.session.live_switch;

        match self.topology.as_mut() {
            None => Err(CameraError::configuration("camera session is not configured")),
            Some(Topology::Dual(dual)) => {
                let active = dual.switch();
                self.recorder.set_active_position(active);
                log::info!("Switched active camera to {}", active.as_str());
                Ok(active)
            }
            Some(Topology::Single(single)) => {
                if recording && policy == LiveSwitchPolicy::Forbid {
                    return Err(CameraError::SwitchNotSupportedWhileRecording);
                }
                let target = single.camera.position().opposite();
                let next = self.catalog.find_device(target)?;
                self.swap_input(next, recording)
            }
        }
    }

    fn swap_input(&mut self, next: DeviceDescriptor, recording: bool) -> Result<CameraPosition, CameraError> {
        let (previous, previous_format) = match self.topology.as_ref() {
            Some(Topology::Single(single)) => (single.camera.clone(), single.format),
            _ => return Err(CameraError::configuration("single-camera session expected")),
        };
        let mut graph = self
            .graph
            .take()
            .ok_or_else(|| CameraError::configuration("camera session is not configured"))?;
        let zoom = graph.device_state(&previous.device.id).map(|s| s.zoom_factor);

        graph.begin_configuration();
        graph.remove_input(previous.input);

        let attached = attach_camera(graph.as_mut(), &next);
        let outcome = match attached {
            Ok(input) => {
                let format = self.configure_device(graph.as_mut(), &next, zoom);
                graph.clear_connection_settings(previous.position());
                Ok((input, format))
            }
            Err(e) => {
                log::warn!("Restoring {} after failed switch: {}", previous.device.name, e);
                match attach_camera(graph.as_mut(), &previous.device) {
                    Ok(input) => {
                        if let Some(choice) = &previous_format {
                            if let Err(e) = apply_format(graph.as_mut(), &previous.device.id, choice) {
                                log::warn!("Restored input kept its default format: {}", e);
                            }
                        }
                        self.apply_preferred(graph.as_mut(), &previous.device, zoom);
                        graph.set_connection_settings(
                            previous.position(),
                            ConnectionSettings::for_device(&previous.device),
                        );
                        if let Some(Topology::Single(single)) = self.topology.as_mut() {
                            single.camera.input = input;
                        }
                    }
                    Err(restore) => log::error!("Failed to restore previous camera: {}", restore),
                }
                Err(e)
            }
        };
        graph.commit_configuration();
        self.graph = Some(graph);

        let (input, format) = outcome?;
        let position = next.position;
        if let Some(Topology::Single(single)) = self.topology.as_mut() {
            single.replace(AttachedCamera { input, device: next }, format);
        }

        self.recorder.set_active_position(position);
        if recording {
            self.recorder.bridge_switch(position);
        }
        log::info!("Switched camera input to {}", position.as_str());
        Ok(position)
    }

    /// Returns the applied factor
    pub fn set_zoom(&mut self, factor: f64) -> Result<f64, CameraError> {
        let (device, state) = self.active_device()?;
        let (_, max) = device.zoom_range(state.format_index);
        let applied = clamp_zoom(factor, max);
        let rate = self.config.session.zoom_ramp_rate;

        let (graph, _) = self.parts()?;
        let mut lock = graph
            .lock_device(&device.id)
            .map_err(|e| configuration_error("zoom", e))?;
        if device.capabilities.smooth_zoom {
            lock.ramp_zoom(applied, rate);
        } else {
            lock.set_zoom_factor(applied);
        }
        log::debug!("Zoom {} requested, {} applied", factor, applied);
        Ok(applied)
    }

    pub fn set_flash(&mut self, on: bool) {
        self.flash_on = on;
    }

    /// Returns the applied bias
    pub fn set_brightness(&mut self, bias: f32) -> Result<f32, CameraError> {
        let (device, _) = self.active_device()?;
        let applied = bias.clamp(device.min_exposure_bias, device.max_exposure_bias);

        let (graph, _) = self.parts()?;
        let mut lock = graph
            .lock_device(&device.id)
            .map_err(|e| configuration_error("exposure bias", e))?;
        lock.set_exposure_bias(applied);
        Ok(applied)
    }

    pub fn available_zoom_levels(&self) -> Vec<f64> {
        match self.active_device() {
            Ok((device, state)) => {
                let (min, max) = device.zoom_range(state.format_index);
                zoom_levels(min, max)
            }
            Err(_) => vec![1.0],
        }
    }

    /// Enable continuous focus, exposure and white balance where supported.
    /// Returns how many modes were enabled.
    pub fn optimize_for_capture(&mut self) -> Result<usize, CameraError> {
        let devices: Vec<DeviceDescriptor> = match self.topology.as_ref() {
            Some(topology) => topology.attached().into_iter().map(|c| c.device.clone()).collect(),
            None => return Err(CameraError::DeviceUnavailable),
        };
        let (graph, _) = self.parts()?;

        let mut enabled = 0;
        for device in &devices {
            let mut lock = graph
                .lock_device(&device.id)
                .map_err(|e| configuration_error("optimize", e))?;
            let caps = &device.capabilities;
            if caps.supports_focus(FocusMode::ContinuousAutoFocus) {
                lock.set_focus_mode(FocusMode::ContinuousAutoFocus);
                enabled += 1;
            } else {
                log::warn!("{} has no continuous autofocus", device.name);
            }
            if caps.supports_exposure(ExposureMode::ContinuousAutoExposure) {
                lock.set_exposure_mode(ExposureMode::ContinuousAutoExposure);
                enabled += 1;
            } else {
                log::warn!("{} has no continuous auto exposure", device.name);
            }
            if caps.supports_white_balance(WhiteBalanceMode::ContinuousAutoWhiteBalance) {
                lock.set_white_balance_mode(WhiteBalanceMode::ContinuousAutoWhiteBalance);
                enabled += 1;
            } else {
                log::warn!("{} has no continuous white balance", device.name);
            }
        }
        Ok(enabled)
    }

    pub fn start_recording(&mut self, max_duration: Option<Duration>) -> Result<PathBuf, CameraError> {
        let recording = self.config.recording.clone();
        let (graph, topology) = self.parts()?;
        if !graph.has_video_connection(OutputKind::VideoData) {
            return Err(CameraError::configuration("video data output has no connection"));
        }
        let with_audio = graph.has_video_connection(OutputKind::AudioData);
        let (resolution, fps) = topology.recording_format();
        // Connections handed over mid-session are refreshed before the file starts.
        for camera in topology.attached() {
            graph.set_connection_settings(camera.position(), ConnectionSettings::for_device(&camera.device));
        }

        let settings = WriterSettings::for_recording(resolution, fps, &recording, with_audio);
        self.recorder.start(settings, max_duration)
    }

    /// Whether switching cameras keeps an active recording going
    pub fn supports_live_switch(&mut self) -> bool {
        if self.catalog.available_positions().len() < 2 {
            return false;
        }
        let dual = match self.topology.as_ref() {
            Some(topology) => topology.kind() == SessionTopology::DualCamera,
            None => {
                self.config.session.allow_dual_camera && self.catalog.backend().supports_multi_cam()
            }
        };
        dual || self.config.session.live_switch == LiveSwitchPolicy::Bridge
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn attach_camera(graph: &mut dyn CaptureGraph, device: &DeviceDescriptor) -> Result<InputId, CameraError> {
    if !graph.can_add_input(device) {
        return Err(CameraError::configuration(format!(
            "session cannot add input {}",
            device.name
        )));
    }
    graph
        .add_input(device)
        .map_err(|e| configuration_error("add input", e))
}

/// Photo and video data outputs, plus audio when a microphone exists
fn attach_outputs(graph: &mut dyn CaptureGraph, microphone: bool) -> Result<(), CameraError> {
    graph
        .add_output(OutputKind::Photo)
        .map_err(|e| configuration_error("photo output", e))?;
    graph
        .add_output(OutputKind::VideoData)
        .map_err(|e| configuration_error("video output", e))?;

    if !microphone {
        log::warn!("No microphone, recordings will be video only");
        return Ok(());
    }
    match graph.add_audio_input() {
        Ok(()) => graph
            .add_output(OutputKind::AudioData)
            .map_err(|e| configuration_error("audio output", e)),
        Err(e) => {
            log::warn!("Microphone unavailable, recordings will be video only: {}", e);
            Ok(())
        }
    }
}
