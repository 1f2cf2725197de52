//! Microphone enumeration through cpal

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::errors::CameraError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDevice {
    /// `mic-{index}-{name hash}`; cpal exposes no stable identifier
    pub id: String,
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub is_default: bool,
}

fn device_id(index: usize, name: &str) -> String {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    format!("mic-{}-{:08x}", index, hasher.finish() & 0xFFFF_FFFF)
}

/// Input devices, default first and then by name
pub fn list_audio_devices() -> Result<Vec<AudioDevice>, CameraError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut devices: Vec<AudioDevice> = host
        .input_devices()
        .map_err(|e| CameraError::capture(format!("Failed to enumerate microphones: {}", e)))?
        .enumerate()
        .filter_map(|(index, device)| {
            let name = device.name().ok()?;
            let config = device.default_input_config().ok()?;
            Some(AudioDevice {
                id: device_id(index, &name),
                is_default: default_name.as_deref() == Some(name.as_str()),
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
                name,
            })
        })
        .collect();

    devices.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.name.cmp(&b.name)));
    Ok(devices)
}

pub fn default_audio_device() -> Result<AudioDevice, CameraError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| CameraError::capture("No default microphone"))?;
    let name = device
        .name()
        .map_err(|e| CameraError::capture(format!("Failed to read microphone name: {}", e)))?;
    let config = device
        .default_input_config()
        .map_err(|e| CameraError::capture(format!("Microphone has no input config: {}", e)))?;

    Ok(AudioDevice {
        id: device_id(0, &name),
        name,
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
        is_default: true,
    })
}

/// Whether the host exposes any microphone
pub fn has_input_device() -> bool {
    cpal::default_host().default_input_device().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_is_stable() {
        assert_eq!(device_id(2, "USB Mic"), device_id(2, "USB Mic"));
        assert!(device_id(0, "USB Mic").starts_with("mic-0-"));
    }

    #[test]
    fn test_default_listed_first() {
        if let Ok(devices) = list_audio_devices() {
            if devices.iter().any(|d| d.is_default) {
                assert!(devices[0].is_default);
            }
        }
    }
}
