//! Deterministic virtual camera hardware
//!
//! `SyntheticBackend` exposes a configurable set of devices. Each attached
//! video input gets its own delivery thread producing solid-colour RGB frames
//! at the device's active frame rate, stamped from one shared `PTSClock`; the
//! microphone thread produces 1024-frame mono chunks at 48 kHz. Inputs
//! attached to a running graph start delivering after the configured switch
//! latency, which reproduces the gap real hardware leaves behind an input swap.
//!
//! A shared [`SyntheticInspector`] records what was done to the hardware and lets
//! tests inject failures.

use super::{
    CaptureBackend, CaptureGraph, DeviceLock, DeviceState, InputId, OutputKind, PhotoSettings,
    PlatformError, PlatformResult, SampleSink,
};
use crate::timing::{frame_duration, PTSClock};
use crate::types::{
    AudioSample, CameraPosition, ConnectionSettings, DeviceDescriptor, DeviceFormat, DeviceKind,
    ExposureMode, FlashMode, FocusMode, Resolution, SessionTopology, VideoSample,
    WhiteBalanceMode,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const AUDIO_CHUNK_FRAMES: usize = 1024;
const AUDIO_SAMPLE_RATE: u32 = 48_000;
const PHOTO_MAX_SIDE: u32 = 640;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Observation and fault injection shared by a backend and its graphs
#[derive(Debug, Default)]
pub struct SyntheticInspector {
    sessions_created: AtomicUsize,
    inputs_added: AtomicUsize,
    inputs_removed: AtomicUsize,
    locks_acquired: AtomicUsize,
    locks_released: AtomicUsize,
    video_delivered: AtomicUsize,
    fail_lock: AtomicBool,
    fail_photo: AtomicBool,
    hold_frames: AtomicBool,
    rejected: Mutex<HashSet<String>>,
    disconnected: Mutex<HashSet<String>>,
    last_photo: Mutex<Option<PhotoSettings>>,
    zoom_log: Mutex<Vec<f64>>,
}

impl SyntheticInspector {
    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    pub fn inputs_added(&self) -> usize {
        self.inputs_added.load(Ordering::SeqCst)
    }

    pub fn inputs_removed(&self) -> usize {
        self.inputs_removed.load(Ordering::SeqCst)
    }

    pub fn locks_acquired(&self) -> usize {
        self.locks_acquired.load(Ordering::SeqCst)
    }

    pub fn locks_released(&self) -> usize {
        self.locks_released.load(Ordering::SeqCst)
    }

    /// Video samples handed to a sink so far
    pub fn video_delivered(&self) -> usize {
        self.video_delivered.load(Ordering::SeqCst)
    }

    pub fn last_photo_settings(&self) -> Option<PhotoSettings> {
        *guard(&self.last_photo)
    }

    /// Every zoom factor written through a device lock, in order
    pub fn zoom_history(&self) -> Vec<f64> {
        guard(&self.zoom_log).clone()
    }

    /// Make every following lock acquisition fail
    pub fn set_fail_lock(&self, fail: bool) {
        self.fail_lock.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_photo(&self, fail: bool) {
        self.fail_photo.store(fail, Ordering::SeqCst);
    }

    /// Keep delivery threads running but stop handing samples to the sink
    pub fn hold_frames(&self, hold: bool) {
        self.hold_frames.store(hold, Ordering::SeqCst);
    }

    /// Refuse to attach the device with this id
    pub fn reject_device(&self, device_id: &str) {
        guard(&self.rejected).insert(device_id.to_string());
    }

    pub fn accept_device(&self, device_id: &str) {
        guard(&self.rejected).remove(device_id);
    }

    pub fn disconnect(&self, device_id: &str) {
        guard(&self.disconnected).insert(device_id.to_string());
    }

    pub fn reconnect(&self, device_id: &str) {
        guard(&self.disconnected).remove(device_id);
    }

    fn is_rejected(&self, device_id: &str) -> bool {
        guard(&self.rejected).contains(device_id)
    }

    fn is_disconnected(&self, device_id: &str) -> bool {
        guard(&self.disconnected).contains(device_id)
    }

    fn holding(&self) -> bool {
        self.hold_frames.load(Ordering::SeqCst)
    }
}

/// Virtual camera hardware
pub struct SyntheticBackend {
    devices: Vec<DeviceDescriptor>,
    multi_cam: bool,
    microphone: bool,
    switch_latency: Duration,
    flash_modes: Vec<FlashMode>,
    inspector: Arc<SyntheticInspector>,
    clock: PTSClock,
}

impl SyntheticBackend {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices,
            multi_cam: false,
            microphone: true,
            switch_latency: Duration::from_millis(100),
            flash_modes: vec![FlashMode::Off, FlashMode::On, FlashMode::Auto],
            inspector: Arc::new(SyntheticInspector::default()),
            clock: PTSClock::new(),
        }
    }

    pub fn with_multi_cam(mut self, supported: bool) -> Self {
        self.multi_cam = supported;
        self
    }

    pub fn with_microphone(mut self, present: bool) -> Self {
        self.microphone = present;
        self
    }

    /// Delay before an input attached to a running session delivers its first frame
    pub fn with_switch_latency(mut self, latency: Duration) -> Self {
        self.switch_latency = latency;
        self
    }

    /// Flash modes reported by the photo output
    pub fn with_flash_modes(mut self, modes: Vec<FlashMode>) -> Self {
        self.flash_modes = modes;
        self
    }

    pub fn inspector(&self) -> Arc<SyntheticInspector> {
        self.inspector.clone()
    }

    pub fn clock(&self) -> &PTSClock {
        &self.clock
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }
}

impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn discover(&self, position: CameraPosition, kinds: &[DeviceKind]) -> Vec<DeviceDescriptor> {
        kinds
            .iter()
            .flat_map(|kind| {
                self.devices
                    .iter()
                    .filter(move |d| d.position == position && d.kind == *kind)
            })
            .filter(|d| self.is_connected(&d.id))
            .cloned()
            .collect()
    }

    fn default_device(&self, position: CameraPosition) -> Option<DeviceDescriptor> {
        self.devices
            .iter()
            .find(|d| d.position == position && self.is_connected(&d.id))
            .cloned()
    }

    fn is_connected(&self, device_id: &str) -> bool {
        self.devices.iter().any(|d| d.id == device_id) && !self.inspector.is_disconnected(device_id)
    }

    fn supports_multi_cam(&self) -> bool {
        self.multi_cam
    }

    fn has_microphone(&self) -> bool {
        self.microphone
    }

    fn create_session(&self, topology: SessionTopology) -> PlatformResult<Box<dyn CaptureGraph>> {
        if topology == SessionTopology::DualCamera && !self.multi_cam {
            return Err(PlatformError::new("multi-camera sessions are not supported"));
        }
        self.inspector.sessions_created.fetch_add(1, Ordering::SeqCst);
        log::debug!("Synthetic session created ({:?})", topology);

        Ok(Box::new(SyntheticGraph {
            topology,
            inspector: self.inspector.clone(),
            clock: self.clock.clone(),
            switch_latency: self.switch_latency,
            microphone: self.microphone,
            flash_modes: self.flash_modes.clone(),
            inputs: Vec::new(),
            audio_input: false,
            audio_worker: None,
            outputs: Vec::new(),
            video_enabled: Arc::new(AtomicBool::new(false)),
            audio_enabled: Arc::new(AtomicBool::new(false)),
            sink: Arc::new(RwLock::new(None)),
            running: false,
            configuring: false,
            connections: HashMap::new(),
            next_input: 1,
        }))
    }
}

type SharedSink = Arc<RwLock<Option<Arc<dyn SampleSink>>>>;

fn current_sink(sink: &SharedSink) -> Option<Arc<dyn SampleSink>> {
    match sink.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Delivery thread handle. Dropping the sender wakes the thread and ends it.
struct Worker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn shutdown(mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Sleep for `duration` unless stopped first; false once the worker must exit
fn pause(stop: &Receiver<()>, duration: Duration) -> bool {
    matches!(stop.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
}

struct AttachedInput {
    id: InputId,
    device: DeviceDescriptor,
    state: Arc<Mutex<DeviceState>>,
    worker: Option<Worker>,
}

struct SyntheticGraph {
    topology: SessionTopology,
    inspector: Arc<SyntheticInspector>,
    clock: PTSClock,
    switch_latency: Duration,
    microphone: bool,
    flash_modes: Vec<FlashMode>,
    inputs: Vec<AttachedInput>,
    audio_input: bool,
    audio_worker: Option<Worker>,
    outputs: Vec<OutputKind>,
    video_enabled: Arc<AtomicBool>,
    audio_enabled: Arc<AtomicBool>,
    sink: SharedSink,
    running: bool,
    configuring: bool,
    connections: HashMap<CameraPosition, ConnectionSettings>,
    next_input: u64,
}

impl SyntheticGraph {
    fn input_for_device(&self, device_id: &str) -> Option<&AttachedInput> {
        self.inputs.iter().find(|i| i.device.id == device_id)
    }

    fn spawn_video_worker(&self, input: &AttachedInput, warmup: Duration) -> Worker {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let source = input.device.position;
        let formats = input.device.formats.clone();
        let state = input.state.clone();
        let sink = self.sink.clone();
        let enabled = self.video_enabled.clone();
        let inspector = self.inspector.clone();
        let clock = self.clock.clone();
        let name = format!("synthetic-video-{}", source.as_str());

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                if !warmup.is_zero() && !pause(&stop_rx, warmup) {
                    return;
                }
                let mut cached: Option<(Resolution, Arc<[u8]>)> = None;
                loop {
                    let (resolution, fps) = {
                        let state = guard(&state);
                        let resolution = formats
                            .get(state.format_index)
                            .map(|f| f.resolution)
                            .unwrap_or(Resolution::new(640, 480));
                        (resolution, state.frame_rate)
                    };
                    let pts = clock.now();

                    if enabled.load(Ordering::SeqCst) && !inspector.holding() {
                        if let Some(sink) = current_sink(&sink) {
                            let data = match &cached {
                                Some((cached_res, data)) if *cached_res == resolution => {
                                    data.clone()
                                }
                                _ => {
                                    let data = solid_frame(resolution, position_colour(source));
                                    cached = Some((resolution, data.clone()));
                                    data
                                }
                            };
                            sink.on_video(VideoSample::captured(
                                source,
                                pts,
                                resolution.width,
                                resolution.height,
                                data,
                            ));
                            inspector.video_delivered.fetch_add(1, Ordering::SeqCst);
                        }
                    }

                    if !pause(&stop_rx, frame_duration(fps)) {
                        break;
                    }
                }
            });

        match handle {
            Ok(handle) => Worker {
                stop: Some(stop_tx),
                handle: Some(handle),
            },
            Err(e) => {
                log::warn!("Failed to spawn synthetic video thread: {}", e);
                Worker {
                    stop: None,
                    handle: None,
                }
            }
        }
    }

    fn spawn_audio_worker(&self) -> Worker {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let sink = self.sink.clone();
        let enabled = self.audio_enabled.clone();
        let inspector = self.inspector.clone();
        let clock = self.clock.clone();
        let chunk = Duration::from_secs_f64(AUDIO_CHUNK_FRAMES as f64 / AUDIO_SAMPLE_RATE as f64);

        let handle = thread::Builder::new()
            .name("synthetic-audio".to_string())
            .spawn(move || {
                let mut phase = 0.0f32;
                let step = 2.0 * std::f32::consts::PI * 440.0 / AUDIO_SAMPLE_RATE as f32;
                loop {
                    let pts = clock.now();
                    if enabled.load(Ordering::SeqCst) && !inspector.holding() {
                        if let Some(sink) = current_sink(&sink) {
                            let samples = (0..AUDIO_CHUNK_FRAMES)
                                .map(|_| {
                                    phase = (phase + step) % (2.0 * std::f32::consts::PI);
                                    phase.sin() * 0.1
                                })
                                .collect();
                            sink.on_audio(AudioSample {
                                pts,
                                sample_rate: AUDIO_SAMPLE_RATE,
                                channels: 1,
                                samples,
                            });
                        }
                    }
                    if !pause(&stop_rx, chunk) {
                        break;
                    }
                }
            });

        match handle {
            Ok(handle) => Worker {
                stop: Some(stop_tx),
                handle: Some(handle),
            },
            Err(e) => {
                log::warn!("Failed to spawn synthetic audio thread: {}", e);
                Worker {
                    stop: None,
                    handle: None,
                }
            }
        }
    }

    fn stop_workers(&mut self) {
        for input in &mut self.inputs {
            if let Some(worker) = input.worker.take() {
                worker.shutdown();
            }
        }
        if let Some(worker) = self.audio_worker.take() {
            worker.shutdown();
        }
    }
}

impl CaptureGraph for SyntheticGraph {
    fn topology(&self) -> SessionTopology {
        self.topology
    }

    fn begin_configuration(&mut self) {
        self.configuring = true;
    }

    fn commit_configuration(&mut self) {
        self.configuring = false;
    }

    fn can_add_input(&self, device: &DeviceDescriptor) -> bool {
        if self.inspector.is_rejected(&device.id) || self.input_for_device(&device.id).is_some() {
            return false;
        }
        match self.topology {
            SessionTopology::SingleCamera => self.inputs.is_empty(),
            SessionTopology::DualCamera => {
                self.inputs.len() < 2
                    && self.inputs.iter().all(|i| i.device.position != device.position)
            }
        }
    }

    fn add_input(&mut self, device: &DeviceDescriptor) -> PlatformResult<InputId> {
        if !self.can_add_input(device) {
            return Err(PlatformError::new(format!(
                "session cannot add input {}",
                device.id
            )));
        }

        let id = InputId(self.next_input);
        self.next_input += 1;

        let first = device.formats.first();
        let state = DeviceState {
            frame_rate: first.map(|f| f.max_fps().min(30.0)).unwrap_or(30.0),
            zoom_factor: 1.0_f64.max(device.min_zoom_factor),
            ..DeviceState::default()
        };

        let mut input = AttachedInput {
            id,
            device: device.clone(),
            state: Arc::new(Mutex::new(state)),
            worker: None,
        };
        if self.running {
            input.worker = Some(self.spawn_video_worker(&input, self.switch_latency));
        }
        self.inputs.push(input);
        self.inspector.inputs_added.fetch_add(1, Ordering::SeqCst);
        log::debug!("Synthetic input {:?} attached ({})", id, device.name);
        Ok(id)
    }

    fn remove_input(&mut self, input: InputId) {
        if let Some(index) = self.inputs.iter().position(|i| i.id == input) {
            let mut removed = self.inputs.remove(index);
            if let Some(worker) = removed.worker.take() {
                worker.shutdown();
            }
            self.inspector.inputs_removed.fetch_add(1, Ordering::SeqCst);
            log::debug!("Synthetic input {:?} detached", input);
        }
    }

    fn add_audio_input(&mut self) -> PlatformResult<()> {
        if !self.microphone {
            return Err(PlatformError::new("no microphone available"));
        }
        self.audio_input = true;
        if self.running && self.audio_worker.is_none() {
            self.audio_worker = Some(self.spawn_audio_worker());
        }
        Ok(())
    }

    fn inputs(&self) -> Vec<InputId> {
        self.inputs.iter().map(|i| i.id).collect()
    }

    fn add_output(&mut self, kind: OutputKind) -> PlatformResult<()> {
        if self.outputs.contains(&kind) {
            return Err(PlatformError::new(format!("output {:?} already attached", kind)));
        }
        match kind {
            OutputKind::VideoData => self.video_enabled.store(true, Ordering::SeqCst),
            OutputKind::AudioData => self.audio_enabled.store(true, Ordering::SeqCst),
            OutputKind::Photo => {}
        }
        self.outputs.push(kind);
        Ok(())
    }

    fn outputs(&self) -> Vec<OutputKind> {
        self.outputs.clone()
    }

    fn remove_all(&mut self) {
        self.stop_workers();
        let removed = self.inputs.len();
        self.inputs.clear();
        self.inspector.inputs_removed.fetch_add(removed, Ordering::SeqCst);
        self.audio_input = false;
        self.outputs.clear();
        self.video_enabled.store(false, Ordering::SeqCst);
        self.audio_enabled.store(false, Ordering::SeqCst);
        self.connections.clear();
    }

    fn set_sample_sink(&mut self, sink: Option<Arc<dyn SampleSink>>) {
        match self.sink.write() {
            Ok(mut guard) => *guard = sink,
            Err(poisoned) => *poisoned.into_inner() = sink,
        }
    }

    fn start_running(&mut self) -> PlatformResult<()> {
        if self.running {
            return Ok(());
        }
        if self.inputs.is_empty() {
            return Err(PlatformError::new("session has no inputs"));
        }
        let workers: Vec<(usize, Worker)> = self
            .inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| input.worker.is_none())
            .map(|(index, input)| (index, self.spawn_video_worker(input, Duration::ZERO)))
            .collect();
        for (index, worker) in workers {
            self.inputs[index].worker = Some(worker);
        }
        if self.audio_input && self.audio_worker.is_none() {
            self.audio_worker = Some(self.spawn_audio_worker());
        }
        self.running = true;
        Ok(())
    }

    fn stop_running(&mut self) {
        self.stop_workers();
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn lock_device(&mut self, device_id: &str) -> PlatformResult<Box<dyn DeviceLock + '_>> {
        if self.inspector.fail_lock.load(Ordering::SeqCst) {
            return Err(PlatformError::new(format!(
                "could not lock {} for configuration",
                device_id
            )));
        }
        let input = self
            .input_for_device(device_id)
            .ok_or_else(|| PlatformError::new(format!("device {} is not attached", device_id)))?;

        self.inspector.locks_acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticLock {
            state: input.state.clone(),
            formats: input.device.formats.clone(),
            inspector: self.inspector.clone(),
        }))
    }

    fn device_state(&self, device_id: &str) -> Option<DeviceState> {
        self.input_for_device(device_id)
            .map(|input| guard(&input.state).clone())
    }

    fn has_video_connection(&self, output: OutputKind) -> bool {
        match output {
            OutputKind::AudioData => self.audio_input && self.outputs.contains(&output),
            _ => !self.inputs.is_empty() && self.outputs.contains(&output),
        }
    }

    fn supported_flash_modes(&self) -> Vec<FlashMode> {
        self.flash_modes.clone()
    }

    fn capture_photo(
        &mut self,
        position: CameraPosition,
        settings: &PhotoSettings,
    ) -> PlatformResult<Vec<u8>> {
        *guard(&self.inspector.last_photo) = Some(*settings);

        if self.inspector.fail_photo.load(Ordering::SeqCst) {
            return Err(PlatformError::new("sensor readout failed"));
        }
        if !self.outputs.contains(&OutputKind::Photo) {
            return Err(PlatformError::new("no photo output attached"));
        }
        let input = self
            .inputs
            .iter()
            .find(|i| i.device.position == position)
            .ok_or_else(|| PlatformError::new(format!("no {} camera attached", position.as_str())))?;

        let resolution = {
            let state = guard(&input.state);
            input
                .device
                .formats
                .get(state.format_index)
                .map(|f| f.resolution)
                .unwrap_or(Resolution::new(640, 480))
        };
        let (width, height) = photo_size(resolution);

        let [r, g, b] = position_colour(position);
        let lift = if settings.flash == FlashMode::On { 50 } else { 0 };
        let mut image = RgbImage::from_pixel(
            width,
            height,
            Rgb([r.saturating_add(lift), g.saturating_add(lift), b.saturating_add(lift)]),
        );
        if self.is_mirrored(position) {
            image::imageops::flip_horizontal_in_place(&mut image);
        }

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, settings.quality.clamp(1, 100))
            .encode_image(&image)
            .map_err(|e| PlatformError::new(format!("JPEG encoding failed: {}", e)))?;
        Ok(jpeg)
    }

    fn set_connection_settings(&mut self, position: CameraPosition, settings: ConnectionSettings) {
        self.connections.insert(position, settings);
    }

    fn clear_connection_settings(&mut self, position: CameraPosition) {
        self.connections.remove(&position);
    }

    fn connection_settings(&self, position: CameraPosition) -> Option<ConnectionSettings> {
        self.connections.get(&position).copied()
    }
}

impl Drop for SyntheticGraph {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

struct SyntheticLock {
    state: Arc<Mutex<DeviceState>>,
    formats: Vec<DeviceFormat>,
    inspector: Arc<SyntheticInspector>,
}

impl SyntheticLock {
    fn record_zoom(&self, factor: f64) {
        guard(&self.inspector.zoom_log).push(factor);
    }
}

impl DeviceLock for SyntheticLock {
    fn set_active_format(&mut self, index: usize) -> PlatformResult<()> {
        let format = self
            .formats
            .get(index)
            .ok_or_else(|| PlatformError::new(format!("format index {} out of range", index)))?;
        let mut state = guard(&self.state);
        state.format_index = index;
        if !format.supports_fps(state.frame_rate) {
            state.frame_rate = format.max_fps().min(30.0);
        }
        Ok(())
    }

    fn set_frame_rate(&mut self, fps: f64) -> PlatformResult<()> {
        let mut state = guard(&self.state);
        let supported = self
            .formats
            .get(state.format_index)
            .map(|f| f.supports_fps(fps))
            .unwrap_or(false);
        if !supported {
            return Err(PlatformError::new(format!(
                "{} fps is not supported by the active format",
                fps
            )));
        }
        state.frame_rate = fps;
        Ok(())
    }

    fn set_zoom_factor(&mut self, factor: f64) {
        guard(&self.state).zoom_factor = factor;
        self.record_zoom(factor);
    }

    fn ramp_zoom(&mut self, factor: f64, _rate: f64) {
        // The ramp settles instantly on virtual hardware.
        self.set_zoom_factor(factor);
    }

    fn set_exposure_bias(&mut self, bias: f32) {
        guard(&self.state).exposure_bias = bias;
    }

    fn set_focus_mode(&mut self, mode: FocusMode) {
        guard(&self.state).focus_mode = Some(mode);
    }

    fn set_exposure_mode(&mut self, mode: ExposureMode) {
        guard(&self.state).exposure_mode = Some(mode);
    }

    fn set_white_balance_mode(&mut self, mode: WhiteBalanceMode) {
        guard(&self.state).white_balance_mode = Some(mode);
    }

    fn set_smooth_autofocus(&mut self, enabled: bool) {
        guard(&self.state).smooth_autofocus = enabled;
    }
}

impl Drop for SyntheticLock {
    fn drop(&mut self) {
        self.inspector.locks_released.fetch_add(1, Ordering::SeqCst);
    }
}

fn position_colour(position: CameraPosition) -> [u8; 3] {
    match position {
        CameraPosition::Front => [200, 90, 80],
        CameraPosition::Back => [70, 110, 200],
    }
}

fn solid_frame(resolution: Resolution, colour: [u8; 3]) -> Arc<[u8]> {
    let pixels = resolution.width as usize * resolution.height as usize;
    let mut data = Vec::with_capacity(pixels * 3);
    for _ in 0..pixels {
        data.extend_from_slice(&colour);
    }
    data.into()
}

fn photo_size(resolution: Resolution) -> (u32, u32) {
    let longest = resolution.width.max(resolution.height).max(1);
    if longest <= PHOTO_MAX_SIDE {
        return (resolution.width.max(1), resolution.height.max(1));
    }
    let scale = PHOTO_MAX_SIDE as f64 / longest as f64;
    (
        ((resolution.width as f64 * scale).round() as u32).max(1),
        ((resolution.height as f64 * scale).round() as u32).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AudioSample;

    #[derive(Default)]
    struct CountingSink {
        video: AtomicUsize,
        audio: AtomicUsize,
    }

    impl SampleSink for CountingSink {
        fn on_video(&self, _sample: VideoSample) {
            self.video.fetch_add(1, Ordering::SeqCst);
        }

        fn on_audio(&self, _sample: AudioSample) {
            self.audio.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn camera(id: &str, position: CameraPosition) -> DeviceDescriptor {
        DeviceDescriptor::new(id, id, position, DeviceKind::WideAngle)
            .with_formats(vec![DeviceFormat::new(64, 48, 1.0, 60.0)])
    }

    #[test]
    fn test_discover_respects_kind_order_and_connection() {
        let backend = SyntheticBackend::new(vec![
            camera("wide", CameraPosition::Back),
            DeviceDescriptor::new("triple", "Triple", CameraPosition::Back, DeviceKind::TripleCamera),
        ]);
        let found = backend.discover(
            CameraPosition::Back,
            &[DeviceKind::TripleCamera, DeviceKind::WideAngle],
        );
        assert_eq!(found[0].id, "triple");
        assert_eq!(found[1].id, "wide");

        backend.inspector().disconnect("triple");
        let found = backend.discover(CameraPosition::Back, &[DeviceKind::TripleCamera]);
        assert!(found.is_empty());
        assert!(!backend.is_connected("triple"));
    }

    #[test]
    fn test_dual_session_requires_multi_cam() {
        let backend = SyntheticBackend::new(vec![camera("a", CameraPosition::Back)]);
        assert!(backend.create_session(SessionTopology::DualCamera).is_err());
        assert!(backend.create_session(SessionTopology::SingleCamera).is_ok());
    }

    #[test]
    fn test_single_topology_holds_one_input() {
        let back = camera("back", CameraPosition::Back);
        let front = camera("front", CameraPosition::Front);
        let backend = SyntheticBackend::new(vec![back.clone(), front.clone()]);
        let mut graph = backend.create_session(SessionTopology::SingleCamera).unwrap();

        let id = graph.add_input(&back).unwrap();
        assert!(!graph.can_add_input(&front));
        graph.remove_input(id);
        assert!(graph.can_add_input(&front));
        assert_eq!(backend.inspector().inputs_removed(), 1);
    }

    #[test]
    fn test_delivery_reaches_sink() {
        let back = camera("back", CameraPosition::Back);
        let backend = SyntheticBackend::new(vec![back.clone()]);
        let mut graph = backend.create_session(SessionTopology::SingleCamera).unwrap();
        let sink = Arc::new(CountingSink::default());

        graph.add_input(&back).unwrap();
        graph.add_audio_input().unwrap();
        graph.add_output(OutputKind::VideoData).unwrap();
        graph.add_output(OutputKind::AudioData).unwrap();
        graph.set_sample_sink(Some(sink.clone()));
        graph.start_running().unwrap();
        thread::sleep(Duration::from_millis(150));
        graph.stop_running();

        assert!(sink.video.load(Ordering::SeqCst) > 0);
        assert!(sink.audio.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_lock_release_counted_on_drop() {
        let back = camera("back", CameraPosition::Back);
        let backend = SyntheticBackend::new(vec![back.clone()]);
        let mut graph = backend.create_session(SessionTopology::SingleCamera).unwrap();
        graph.add_input(&back).unwrap();

        {
            let mut lock = graph.lock_device("back").unwrap();
            assert!(lock.set_frame_rate(120.0).is_err());
            lock.set_zoom_factor(1.0);
        }
        let inspector = backend.inspector();
        assert_eq!(inspector.locks_acquired(), 1);
        assert_eq!(inspector.locks_released(), 1);
    }

    #[test]
    fn test_photo_is_jpeg() {
        let back = camera("back", CameraPosition::Back);
        let backend = SyntheticBackend::new(vec![back.clone()]);
        let mut graph = backend.create_session(SessionTopology::SingleCamera).unwrap();
        graph.add_input(&back).unwrap();
        graph.add_output(OutputKind::Photo).unwrap();

        let settings = PhotoSettings {
            flash: FlashMode::Off,
            quality: 90,
        };
        let jpeg = graph.capture_photo(CameraPosition::Back, &settings).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(backend.inspector().last_photo_settings(), Some(settings));
    }

    #[test]
    fn test_photo_size_is_bounded() {
        assert_eq!(photo_size(Resolution::new(4032, 3024)), (640, 480));
        assert_eq!(photo_size(Resolution::new(320, 240)), (320, 240));
    }
}
