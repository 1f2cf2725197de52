//! Configuration management for duocam
//!
//! Provides loading, saving and validation of session, recording and storage
//! settings.

use crate::errors::CameraError;
use crate::types::{AudioCodec, CameraPosition, LiveSwitchPolicy, Resolution};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DuocamConfig {
    pub session: SessionConfig,
    pub recording: RecordingConfig,
    pub storage: StorageConfig,
}

/// Capture session behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Position used for the first configuration
    pub preferred_position: CameraPosition,
    /// Use the dual-camera topology when the hardware supports it
    pub allow_dual_camera: bool,
    /// Single-camera behaviour when switching mid-recording
    pub live_switch: LiveSwitchPolicy,
    /// Upper bound for any synchronous call onto the session context
    pub operation_timeout_ms: u64,
    /// Zoom ramp rate (doublings per second) on devices with smooth zoom
    pub zoom_ramp_rate: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            preferred_position: CameraPosition::Back,
            allow_dual_camera: true,
            live_switch: LiveSwitchPolicy::Bridge,
            operation_timeout_ms: 10_000,
            zoom_ramp_rate: 4.0,
        }
    }
}

/// Recording writer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Encoder size when no format was negotiated [width, height]
    pub fallback_resolution: [u32; 2],
    pub fallback_fps: u32,
    /// Length of the filler run synthesized across a single-camera switch
    pub bridge_window_ms: u64,
    /// Readiness polls before a sample is dropped
    pub append_retry_attempts: u32,
    pub append_retry_backoff_ms: u64,
    pub video_bitrate: u32,
    pub audio_codec: AudioCodec,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    pub audio_bitrate: u32,
    /// Upper bound for waiting on container finalization
    pub finalize_timeout_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            fallback_resolution: [1280, 720],
            fallback_fps: 30,
            bridge_window_ms: 150,
            append_retry_attempts: 10,
            append_retry_backoff_ms: 2,
            video_bitrate: 5_000_000,
            audio_codec: AudioCodec::Aac,
            audio_sample_rate: 48_000,
            audio_channels: 1,
            audio_bitrate: 64_000,
            finalize_timeout_ms: 15_000,
        }
    }
}

impl RecordingConfig {
    pub fn fallback_resolution(&self) -> Resolution {
        Resolution::new(self.fallback_resolution[0], self.fallback_resolution[1])
    }

    pub fn bridge_window(&self) -> Duration {
        Duration::from_millis(self.bridge_window_ms)
    }

    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_millis(self.finalize_timeout_ms)
    }
}

/// Where captured artifacts are written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Output directory; empty means the process temporary directory
    pub output_directory: String,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_directory: String::new(),
            jpeg_quality: 92,
        }
    }
}

impl StorageConfig {
    pub fn output_dir(&self) -> PathBuf {
        if self.output_directory.is_empty() {
            std::env::temp_dir()
        } else {
            PathBuf::from(&self.output_directory)
        }
    }
}

impl DuocamConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;

        let config: DuocamConfig = toml::from_str(&contents).map_err(|e| {
            CameraError::InvalidArgument(format!("Failed to parse config file: {}", e))
        })?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            CameraError::InvalidArgument(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("duocam.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.session.operation_timeout_ms == 0 {
            return Err("Operation timeout must be positive".to_string());
        }
        if self.session.zoom_ramp_rate <= 0.0 {
            return Err("Zoom ramp rate must be positive".to_string());
        }

        let rec = &self.recording;
        if rec.fallback_resolution[0] == 0 || rec.fallback_resolution[1] == 0 {
            return Err("Invalid fallback resolution".to_string());
        }
        if rec.fallback_fps == 0 || rec.fallback_fps > 240 {
            return Err("Invalid fallback FPS (must be 1-240)".to_string());
        }
        if rec.bridge_window_ms > 2_000 {
            return Err("Bridge window must not exceed 2000ms".to_string());
        }
        if rec.append_retry_attempts == 0 {
            return Err("At least one append attempt is required".to_string());
        }
        if rec.audio_channels != 1 && rec.audio_channels != 2 {
            return Err("Audio channels must be 1 or 2".to_string());
        }
        if !rec.audio_codec.supports_sample_rate(rec.audio_sample_rate) {
            return Err(format!(
                "{:?} cannot encode at {}Hz",
                rec.audio_codec, rec.audio_sample_rate
            ));
        }

        if self.storage.jpeg_quality == 0 || self.storage.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }

        Ok(())
    }
}
