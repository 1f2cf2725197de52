//! Core data types shared across the capture engine

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Logical camera slot, independent of the hardware behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    Front,
    Back,
}

impl CameraPosition {
    pub fn opposite(self) -> Self {
        match self {
            CameraPosition::Front => CameraPosition::Back,
            CameraPosition::Back => CameraPosition::Front,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraPosition::Front => "front",
            CameraPosition::Back => "back",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            CameraPosition::Front => 0,
            CameraPosition::Back => 1,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        if value == 0 {
            CameraPosition::Front
        } else {
            CameraPosition::Back
        }
    }
}

/// Physical device type, used by the catalog's selection priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    TripleCamera,
    DualWideCamera,
    DualCamera,
    WideAngle,
    UltraWide,
    Telephoto,
    TrueDepth,
}

/// Pixel dimensions as reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// (max side, min side), so portrait and landscape reports of one sensor mode compare equal
    pub fn normalized(&self) -> (u32, u32) {
        (self.width.max(self.height), self.width.min(self.height))
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn same_mode(&self, other: &Resolution) -> bool {
        self.normalized() == other.normalized()
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Inclusive frame-rate range supported by a format
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRateRange {
    pub min_fps: f64,
    pub max_fps: f64,
}

impl FrameRateRange {
    pub const fn new(min_fps: f64, max_fps: f64) -> Self {
        Self { min_fps, max_fps }
    }

    pub fn contains(&self, fps: f64) -> bool {
        fps >= self.min_fps - 0.01 && fps <= self.max_fps + 0.01
    }
}

/// One selectable sensor format of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFormat {
    pub resolution: Resolution,
    pub frame_rate_ranges: Vec<FrameRateRange>,
    /// Maximum zoom factor while this format is active
    pub max_zoom_factor: f64,
    /// Whether the format may be active while another camera streams
    pub multi_cam_supported: bool,
}

impl DeviceFormat {
    pub fn new(width: u32, height: u32, min_fps: f64, max_fps: f64) -> Self {
        Self {
            resolution: Resolution::new(width, height),
            frame_rate_ranges: vec![FrameRateRange::new(min_fps, max_fps)],
            max_zoom_factor: 1.0,
            multi_cam_supported: false,
        }
    }

    pub fn with_max_zoom(mut self, max_zoom_factor: f64) -> Self {
        self.max_zoom_factor = max_zoom_factor;
        self
    }

    pub fn with_multi_cam(mut self, supported: bool) -> Self {
        self.multi_cam_supported = supported;
        self
    }

    pub fn max_fps(&self) -> f64 {
        self.frame_rate_ranges
            .iter()
            .map(|r| r.max_fps)
            .fold(0.0, f64::max)
    }

    pub fn supports_fps(&self, fps: f64) -> bool {
        self.frame_rate_ranges.iter().any(|r| r.contains(fps))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    Off,
    On,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusMode {
    Locked,
    AutoFocus,
    ContinuousAutoFocus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureMode {
    Locked,
    AutoExpose,
    ContinuousAutoExposure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhiteBalanceMode {
    Locked,
    AutoWhiteBalance,
    ContinuousAutoWhiteBalance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoOrientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StabilizationMode {
    Off,
    Standard,
    Cinematic,
    Auto,
}

/// Orientation, mirroring and stabilization of the connections fed by one camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub orientation: VideoOrientation,
    pub mirrored: bool,
    pub stabilization: StabilizationMode,
}

impl ConnectionSettings {
    /// Portrait output, front camera mirrored, automatic stabilization when the device has it
    pub fn for_device(device: &DeviceDescriptor) -> Self {
        Self {
            orientation: VideoOrientation::Portrait,
            mirrored: device.position == CameraPosition::Front,
            stabilization: if device.capabilities.video_stabilization {
                StabilizationMode::Auto
            } else {
                StabilizationMode::Off
            },
        }
    }
}

/// Mode support flags of a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub focus_modes: Vec<FocusMode>,
    pub exposure_modes: Vec<ExposureMode>,
    pub white_balance_modes: Vec<WhiteBalanceMode>,
    pub smooth_autofocus: bool,
    /// Device can ramp zoom instead of jumping
    pub smooth_zoom: bool,
    pub video_stabilization: bool,
}

impl DeviceCapabilities {
    /// Everything a modern phone camera supports
    pub fn full() -> Self {
        Self {
            focus_modes: vec![
                FocusMode::Locked,
                FocusMode::AutoFocus,
                FocusMode::ContinuousAutoFocus,
            ],
            exposure_modes: vec![
                ExposureMode::Locked,
                ExposureMode::AutoExpose,
                ExposureMode::ContinuousAutoExposure,
            ],
            white_balance_modes: vec![
                WhiteBalanceMode::Locked,
                WhiteBalanceMode::AutoWhiteBalance,
                WhiteBalanceMode::ContinuousAutoWhiteBalance,
            ],
            smooth_autofocus: true,
            smooth_zoom: true,
            video_stabilization: true,
        }
    }

    pub fn supports_focus(&self, mode: FocusMode) -> bool {
        self.focus_modes.contains(&mode)
    }

    pub fn supports_exposure(&self, mode: ExposureMode) -> bool {
        self.exposure_modes.contains(&mode)
    }

    pub fn supports_white_balance(&self, mode: WhiteBalanceMode) -> bool {
        self.white_balance_modes.contains(&mode)
    }
}

/// One physical camera as seen by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: String,
    pub position: CameraPosition,
    pub kind: DeviceKind,
    pub formats: Vec<DeviceFormat>,
    /// Smallest zoom factor the device accepts (below 1.0 on ultra-wide composites)
    pub min_zoom_factor: f64,
    pub min_exposure_bias: f32,
    pub max_exposure_bias: f32,
    pub capabilities: DeviceCapabilities,
}

impl DeviceDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        position: CameraPosition,
        kind: DeviceKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
            kind,
            formats: Vec::new(),
            min_zoom_factor: 1.0,
            min_exposure_bias: -8.0,
            max_exposure_bias: 8.0,
            capabilities: DeviceCapabilities::default(),
        }
    }

    pub fn with_formats(mut self, formats: Vec<DeviceFormat>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_min_zoom(mut self, min_zoom_factor: f64) -> Self {
        self.min_zoom_factor = min_zoom_factor;
        self
    }

    pub fn with_exposure_bias(mut self, min: f32, max: f32) -> Self {
        self.min_exposure_bias = min;
        self.max_exposure_bias = max;
        self
    }

    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn format(&self, index: usize) -> Option<&DeviceFormat> {
        self.formats.get(index)
    }

    pub fn max_frame_rate(&self) -> f64 {
        self.formats.iter().map(DeviceFormat::max_fps).fold(0.0, f64::max)
    }

    /// Supported zoom range with the given format active
    pub fn zoom_range(&self, format_index: usize) -> (f64, f64) {
        let max = self
            .format(format_index)
            .map(|f| f.max_zoom_factor)
            .unwrap_or(1.0);
        (self.min_zoom_factor.min(max), max)
    }
}

/// Shape of the camera inputs, decided once per configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionTopology {
    SingleCamera,
    DualCamera,
}

/// Whether a single-camera session may swap inputs while recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveSwitchPolicy {
    /// Swap the input and mask the gap with filler frames
    Bridge,
    /// Refuse with `SwitchNotSupportedWhileRecording`
    Forbid,
}

/// Sampling frequencies an AAC ADTS header can signal
pub const AAC_SAMPLE_RATES: [u32; 12] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025, 8_000,
];

/// Codec of the recording audio track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    /// AAC-LC, ADTS framed
    #[default]
    Aac,
    /// Opus, always encoded at 48kHz
    Opus,
}

impl AudioCodec {
    pub fn supports_sample_rate(&self, rate: u32) -> bool {
        match self {
            AudioCodec::Aac => AAC_SAMPLE_RATES.contains(&rate),
            // Resampled to 48kHz before encoding
            AudioCodec::Opus => rate > 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    Captured,
    Filler,
}

/// One video frame delivered by a camera (RGB24)
#[derive(Debug, Clone)]
pub struct VideoSample {
    pub source: CameraPosition,
    /// Presentation time on the capture clock
    pub pts: Duration,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    pub kind: FrameKind,
}

impl VideoSample {
    pub fn captured(
        source: CameraPosition,
        pts: Duration,
        width: u32,
        height: u32,
        data: Arc<[u8]>,
    ) -> Self {
        Self {
            source,
            pts,
            width,
            height,
            data,
            kind: FrameKind::Captured,
        }
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// One chunk of interleaved f32 PCM from the microphone
#[derive(Debug, Clone)]
pub struct AudioSample {
    pub pts: Duration,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioSample {
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_resolution_ignores_orientation() {
        let landscape = Resolution::new(1920, 1080);
        let portrait = Resolution::new(1080, 1920);
        assert_eq!(landscape.normalized(), (1920, 1080));
        assert!(landscape.same_mode(&portrait));
        assert!(!landscape.same_mode(&Resolution::new(1280, 720)));
    }

    #[test]
    fn test_position_opposite() {
        assert_eq!(CameraPosition::Front.opposite(), CameraPosition::Back);
        assert_eq!(CameraPosition::Back.opposite(), CameraPosition::Front);
        assert_eq!(CameraPosition::from_u8(CameraPosition::Front.to_u8()), CameraPosition::Front);
    }

    #[test]
    fn test_format_fps_queries() {
        let mut format = DeviceFormat::new(1920, 1080, 1.0, 30.0);
        format.frame_rate_ranges.push(FrameRateRange::new(60.0, 60.0));
        assert_eq!(format.max_fps(), 60.0);
        assert!(format.supports_fps(24.0));
        assert!(format.supports_fps(60.0));
        assert!(!format.supports_fps(45.0));
    }

    #[test]
    fn test_zoom_range_uses_active_format() {
        let device = DeviceDescriptor::new("cam", "Cam", CameraPosition::Back, DeviceKind::TripleCamera)
            .with_formats(vec![
                DeviceFormat::new(1280, 720, 1.0, 30.0).with_max_zoom(10.0),
                DeviceFormat::new(3840, 2160, 1.0, 30.0).with_max_zoom(5.0),
            ])
            .with_min_zoom(0.5);
        assert_eq!(device.zoom_range(0), (0.5, 10.0));
        assert_eq!(device.zoom_range(1), (0.5, 5.0));
        assert_eq!(device.zoom_range(7), (0.5, 1.0));
    }

    #[test]
    fn test_audio_sample_duration() {
        let sample = AudioSample {
            pts: Duration::ZERO,
            sample_rate: 48_000,
            channels: 1,
            samples: vec![0.0; 960],
        };
        assert_eq!(sample.duration(), Duration::from_millis(20));
    }

    #[test]
    fn test_audio_codec_rates() {
        assert_eq!(AudioCodec::default(), AudioCodec::Aac);
        assert!(AudioCodec::Aac.supports_sample_rate(44_100));
        assert!(!AudioCodec::Aac.supports_sample_rate(47_000));
        assert!(AudioCodec::Opus.supports_sample_rate(47_000));
        assert_eq!(serde_json::to_string(&AudioCodec::Opus).unwrap(), "\"opus\"");
    }
}
