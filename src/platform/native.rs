//! Desktop cameras through nokhwa
//!
//! Desktop hardware has no notion of front and back: the first enumerated
//! camera is reported as the front (user-facing) camera and every further one
//! as a back camera. Sessions are single-camera only. Each open camera stream
//! lives on its own thread that owns the `CallbackCamera`, so no nokhwa handle
//! ever crosses threads. Zoom, exposure and focus are tracked as device state
//! but not forwarded; nokhwa exposes no portable controls for them.

use super::{
    CaptureBackend, CaptureGraph, DeviceLock, DeviceState, InputId, OutputKind, PhotoSettings,
    PlatformError, PlatformResult, SampleSink,
};
use crate::timing::PTSClock;
use crate::types::{
    AudioSample, CameraPosition, ConnectionSettings, DeviceCapabilities, DeviceDescriptor, DeviceFormat, DeviceKind,
    ExposureMode, FlashMode, FocusMode, Resolution, SessionTopology, VideoSample,
    WhiteBalanceMode,
};
use crossbeam_channel::Sender;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
};
use nokhwa::CallbackCamera;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Modes most UVC webcams stream in
fn common_formats() -> Vec<DeviceFormat> {
    vec![
        DeviceFormat::new(1920, 1080, 5.0, 30.0),
        DeviceFormat::new(1280, 720, 5.0, 30.0),
        DeviceFormat::new(640, 480, 5.0, 30.0),
    ]
}

fn webcam_capabilities() -> DeviceCapabilities {
    DeviceCapabilities {
        focus_modes: vec![FocusMode::ContinuousAutoFocus],
        exposure_modes: vec![ExposureMode::ContinuousAutoExposure],
        white_balance_modes: vec![WhiteBalanceMode::ContinuousAutoWhiteBalance],
        ..DeviceCapabilities::default()
    }
}

pub struct NativeBackend {
    devices: Vec<DeviceDescriptor>,
    clock: PTSClock,
}

impl NativeBackend {
    /// Enumerate connected cameras
    pub fn new() -> PlatformResult<Self> {
        let cameras = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| PlatformError::new(format!("Failed to query cameras: {}", e)))?;

        let devices = cameras
            .iter()
            .enumerate()
            .map(|(n, info)| {
                let position = if n == 0 {
                    CameraPosition::Front
                } else {
                    CameraPosition::Back
                };
                DeviceDescriptor::new(
                    info.index().to_string(),
                    info.human_name(),
                    position,
                    DeviceKind::WideAngle,
                )
                .with_formats(common_formats())
                .with_capabilities(webcam_capabilities())
            })
            .collect::<Vec<_>>();

        log::info!("Native backend found {} camera(s)", devices.len());
        Ok(Self {
            devices,
            clock: PTSClock::new(),
        })
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }
}

impl CaptureBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn discover(&self, position: CameraPosition, kinds: &[DeviceKind]) -> Vec<DeviceDescriptor> {
        self.devices
            .iter()
            .filter(|d| d.position == position && kinds.contains(&d.kind))
            .cloned()
            .collect()
    }

    fn default_device(&self, position: CameraPosition) -> Option<DeviceDescriptor> {
        self.devices.iter().find(|d| d.position == position).cloned()
    }

    fn is_connected(&self, device_id: &str) -> bool {
        nokhwa::query(ApiBackend::Auto)
            .map(|cameras| cameras.iter().any(|c| c.index().to_string() == device_id))
            .unwrap_or(false)
    }

    fn supports_multi_cam(&self) -> bool {
        false
    }

    fn has_microphone(&self) -> bool {
        #[cfg(feature = "audio")]
        {
            crate::audio::has_input_device()
        }
        #[cfg(not(feature = "audio"))]
        {
            false
        }
    }

    fn create_session(&self, topology: SessionTopology) -> PlatformResult<Box<dyn CaptureGraph>> {
        if topology == SessionTopology::DualCamera {
            return Err(PlatformError::new("desktop cameras cannot stream concurrently"));
        }
        Ok(Box::new(NativeGraph {
            clock: self.clock.clone(),
            relay: Arc::new(SinkRelay::default()),
            input: None,
            audio_input: false,
            microphone: None,
            outputs: Vec::new(),
            running: false,
            connections: HashMap::new(),
            next_input: 1,
        }))
    }
}

/// Forwards delivery to whatever sink is currently installed
#[derive(Default)]
struct SinkRelay {
    sink: RwLock<Option<Arc<dyn SampleSink>>>,
    video: AtomicBool,
    audio: AtomicBool,
}

impl SinkRelay {
    fn current(&self) -> Option<Arc<dyn SampleSink>> {
        match self.sink.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SampleSink for SinkRelay {
    fn on_video(&self, sample: VideoSample) {
        if self.video.load(Ordering::SeqCst) {
            if let Some(sink) = self.current() {
                sink.on_video(sample);
            }
        }
    }

    fn on_audio(&self, sample: AudioSample) {
        if self.audio.load(Ordering::SeqCst) {
            if let Some(sink) = self.current() {
                sink.on_audio(sample);
            }
        }
    }
}

/// Thread owning one open stream; dropping the sender closes it
struct StreamThread {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    fn shutdown(mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct NativeInput {
    id: InputId,
    device: DeviceDescriptor,
    state: Arc<Mutex<DeviceState>>,
    latest: Arc<Mutex<Option<RgbImage>>>,
    stream: Option<StreamThread>,
}

struct NativeGraph {
    clock: PTSClock,
    relay: Arc<SinkRelay>,
    input: Option<NativeInput>,
    audio_input: bool,
    microphone: Option<StreamThread>,
    outputs: Vec<OutputKind>,
    running: bool,
    connections: HashMap<CameraPosition, ConnectionSettings>,
    next_input: u64,
}

impl NativeGraph {
    fn open_camera(&self, input: &NativeInput) -> PlatformResult<StreamThread> {
        let index: u32 = input
            .device
            .id
            .parse()
            .map_err(|_| PlatformError::new(format!("invalid camera id {}", input.device.id)))?;
        let (resolution, fps) = {
            let state = guard(&input.state);
            let resolution = input
                .device
                .format(state.format_index)
                .map(|f| f.resolution)
                .unwrap_or(Resolution::new(1280, 720));
            (resolution, state.frame_rate)
        };

        let source = input.device.position;
        let relay = self.relay.clone();
        let latest = input.latest.clone();
        let clock = self.clock.clone();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<PlatformResult<()>>(1);

        let handle = thread::Builder::new()
            .name(format!("native-camera-{}", index))
            .spawn(move || {
                let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                    CameraFormat::new(
                        nokhwa::utils::Resolution::new(resolution.width, resolution.height),
                        FrameFormat::MJPEG,
                        fps.round().max(1.0) as u32,
                    ),
                ));
                let callback = move |buffer: nokhwa::Buffer| {
                    let pts = clock.now();
                    match buffer.decode_image::<RgbFormat>() {
                        Ok(image) => {
                            let (width, height) = (image.width(), image.height());
                            let data = image.into_raw();
                            *guard(&latest) = RgbImage::from_raw(width, height, data.clone());
                            relay.on_video(VideoSample::captured(
                                source,
                                pts,
                                width,
                                height,
                                data.into(),
                            ));
                        }
                        Err(e) => log::debug!("Dropping undecodable frame: {}", e),
                    }
                };

                let mut camera =
                    match CallbackCamera::new(CameraIndex::Index(index), requested, callback) {
                        Ok(camera) => camera,
                        Err(e) => {
                            let _ = ready_tx.send(Err(PlatformError::new(format!(
                                "Failed to open camera {}: {}",
                                index, e
                            ))));
                            return;
                        }
                    };
                if let Err(e) = camera.open_stream() {
                    let _ = ready_tx.send(Err(PlatformError::new(format!(
                        "Failed to start camera {}: {}",
                        index, e
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Blocks until the sender is dropped.
                let _ = stop_rx.recv();
                if let Err(e) = camera.stop_stream() {
                    log::warn!("Failed to stop camera {}: {}", index, e);
                }
            })
            .map_err(|e| PlatformError::new(format!("Failed to spawn camera thread: {}", e)))?;

        let thread = StreamThread {
            stop: Some(stop_tx),
            handle: Some(handle),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(thread),
            Ok(Err(e)) => {
                thread.shutdown();
                Err(e)
            }
            Err(_) => {
                thread.shutdown();
                Err(PlatformError::new("camera thread exited during startup"))
            }
        }
    }

    #[cfg(feature = "audio")]
    fn open_microphone(&self) -> PlatformResult<StreamThread> {
        use crate::audio::MicrophoneCapture;

        let relay: Arc<dyn SampleSink> = self.relay.clone();
        let clock = self.clock.clone();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<PlatformResult<()>>(1);

        let handle = thread::Builder::new()
            .name("native-microphone".to_string())
            .spawn(move || {
                let opened = MicrophoneCapture::open(clock, relay).and_then(|mut mic| {
                    mic.start()?;
                    Ok(mic)
                });
                let mic = match opened {
                    Ok(mic) => mic,
                    Err(e) => {
                        let _ = ready_tx.send(Err(PlatformError::new(e.to_string())));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(mic);
            })
            .map_err(|e| PlatformError::new(format!("Failed to spawn microphone thread: {}", e)))?;

        let thread = StreamThread {
            stop: Some(stop_tx),
            handle: Some(handle),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(thread),
            Ok(Err(e)) => {
                thread.shutdown();
                Err(e)
            }
            Err(_) => {
                thread.shutdown();
                Err(PlatformError::new("microphone thread exited during startup"))
            }
        }
    }

    #[cfg(not(feature = "audio"))]
    fn open_microphone(&self) -> PlatformResult<StreamThread> {
        Err(PlatformError::new("built without microphone support"))
    }

    fn close_streams(&mut self) {
        if let Some(stream) = self.input.as_mut().and_then(|i| i.stream.take()) {
            stream.shutdown();
        }
        if let Some(mic) = self.microphone.take() {
            mic.shutdown();
        }
    }
}

impl CaptureGraph for NativeGraph {
    fn topology(&self) -> SessionTopology {
        SessionTopology::SingleCamera
    }

    fn begin_configuration(&mut self) {}

    fn commit_configuration(&mut self) {}

    fn can_add_input(&self, device: &DeviceDescriptor) -> bool {
        self.input.is_none() && device.id.parse::<u32>().is_ok()
    }

    fn add_input(&mut self, device: &DeviceDescriptor) -> PlatformResult<InputId> {
        if !self.can_add_input(device) {
            return Err(PlatformError::new(format!("session cannot add input {}", device.id)));
        }
        let id = InputId(self.next_input);
        self.next_input += 1;

        let state = DeviceState {
            frame_rate: device.max_frame_rate().min(30.0),
            ..DeviceState::default()
        };
        let mut input = NativeInput {
            id,
            device: device.clone(),
            state: Arc::new(Mutex::new(state)),
            latest: Arc::new(Mutex::new(None)),
            stream: None,
        };
        if self.running {
            input.stream = Some(self.open_camera(&input)?);
        }
        log::debug!("Native input {:?} attached ({})", id, device.name);
        self.input = Some(input);
        Ok(id)
    }

    fn remove_input(&mut self, input: InputId) {
        if self.input.as_ref().map(|i| i.id) == Some(input) {
            if let Some(stream) = self.input.take().and_then(|mut i| i.stream.take()) {
                stream.shutdown();
            }
        }
    }

    fn add_audio_input(&mut self) -> PlatformResult<()> {
        if !cfg!(feature = "audio") {
            return Err(PlatformError::new("built without microphone support"));
        }
        self.audio_input = true;
        if self.running && self.microphone.is_none() {
            self.microphone = Some(self.open_microphone()?);
        }
        Ok(())
    }

    fn inputs(&self) -> Vec<InputId> {
        self.input.iter().map(|i| i.id).collect()
    }

    fn add_output(&mut self, kind: OutputKind) -> PlatformResult<()> {
        if self.outputs.contains(&kind) {
            return Err(PlatformError::new(format!("output {:?} already attached", kind)));
        }
        match kind {
            OutputKind::VideoData => self.relay.video.store(true, Ordering::SeqCst),
            OutputKind::AudioData => self.relay.audio.store(true, Ordering::SeqCst),
            OutputKind::Photo => {}
        }
        self.outputs.push(kind);
        Ok(())
    }

    fn outputs(&self) -> Vec<OutputKind> {
        self.outputs.clone()
    }

    fn remove_all(&mut self) {
        self.close_streams();
        self.input = None;
        self.audio_input = false;
        self.outputs.clear();
        self.relay.video.store(false, Ordering::SeqCst);
        self.relay.audio.store(false, Ordering::SeqCst);
        self.connections.clear();
    }

    fn set_sample_sink(&mut self, sink: Option<Arc<dyn SampleSink>>) {
        match self.relay.sink.write() {
            Ok(mut guard) => *guard = sink,
            Err(poisoned) => *poisoned.into_inner() = sink,
        }
    }

    fn start_running(&mut self) -> PlatformResult<()> {
        if self.running {
            return Ok(());
        }
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| PlatformError::new("session has no inputs"))?;
        let stream = self.open_camera(input)?;
        if let Some(input) = self.input.as_mut() {
            input.stream = Some(stream);
        }
        if self.audio_input && self.microphone.is_none() {
            match self.open_microphone() {
                Ok(mic) => self.microphone = Some(mic),
                Err(e) => log::warn!("Recording without microphone: {}", e),
            }
        }
        self.running = true;
        Ok(())
    }

    fn stop_running(&mut self) {
        self.close_streams();
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn lock_device(&mut self, device_id: &str) -> PlatformResult<Box<dyn DeviceLock + '_>> {
        let input = self
            .input
            .as_ref()
            .filter(|i| i.device.id == device_id)
            .ok_or_else(|| PlatformError::new(format!("device {} is not attached", device_id)))?;
        Ok(Box::new(NativeLock {
            state: input.state.clone(),
            formats: input.device.formats.clone(),
        }))
    }

    fn device_state(&self, device_id: &str) -> Option<DeviceState> {
        self.input
            .as_ref()
            .filter(|i| i.device.id == device_id)
            .map(|i| guard(&i.state).clone())
    }

    fn has_video_connection(&self, output: OutputKind) -> bool {
        match output {
            OutputKind::AudioData => self.audio_input && self.outputs.contains(&output),
            _ => self.input.is_some() && self.outputs.contains(&output),
        }
    }

    fn supported_flash_modes(&self) -> Vec<FlashMode> {
        vec![FlashMode::Off]
    }

    fn capture_photo(
        &mut self,
        position: CameraPosition,
        settings: &PhotoSettings,
    ) -> PlatformResult<Vec<u8>> {
        if !self.outputs.contains(&OutputKind::Photo) {
            return Err(PlatformError::new("no photo output attached"));
        }
        let input = self
            .input
            .as_ref()
            .filter(|i| i.device.position == position)
            .ok_or_else(|| PlatformError::new(format!("no {} camera attached", position.as_str())))?;

        let mut image = guard(&input.latest)
            .clone()
            .ok_or_else(|| PlatformError::new("no frame delivered yet"))?;
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

impl Drop for NativeGraph {
    fn drop(&mut self) {
        self.close_streams();
    }
}

struct NativeLock {
    state: Arc<Mutex<DeviceState>>,
    formats: Vec<DeviceFormat>,
}

impl DeviceLock for NativeLock {
    fn set_active_format(&mut self, index: usize) -> PlatformResult<()> {
        if index >= self.formats.len() {
            return Err(PlatformError::new(format!("format index {} out of range", index)));
        }
        guard(&self.state).format_index = index;
        Ok(())
    }

    fn set_frame_rate(&mut self, fps: f64) -> PlatformResult<()> {
        let mut state = guard(&self.state);
        match self.formats.get(state.format_index) {
            Some(format) if format.supports_fps(fps) => {
                state.frame_rate = fps;
                Ok(())
            }
            _ => Err(PlatformError::new(format!("{} fps is not supported", fps))),
        }
    }

    fn set_zoom_factor(&mut self, factor: f64) {
        guard(&self.state).zoom_factor = factor;
    }

    fn ramp_zoom(&mut self, factor: f64, _rate: f64) {
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
