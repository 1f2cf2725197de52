//! Testing utilities for duocam
//!
//! Device presets modelled on common phone camera modules, plus synthetic
//! sample generators, so the whole engine can be exercised without hardware.

pub mod synthetic_data;

pub use synthetic_data::{synthetic_audio_sample, synthetic_video_sample};

use crate::platform::SyntheticBackend;
use crate::types::{
    CameraPosition, DeviceCapabilities, DeviceDescriptor, DeviceFormat, DeviceKind, FocusMode,
};
use std::time::Duration;

/// Back triple-camera module: ultra-wide reachable through zoom 0.5
pub fn phone_back_triple() -> DeviceDescriptor {
    DeviceDescriptor::new(
        "back-triple",
        "Back Triple Camera",
        CameraPosition::Back,
        DeviceKind::TripleCamera,
    )
    .with_formats(vec![
        DeviceFormat::new(1280, 720, 1.0, 60.0)
            .with_max_zoom(15.0)
            .with_multi_cam(true),
        DeviceFormat::new(1920, 1080, 1.0, 60.0)
            .with_max_zoom(15.0)
            .with_multi_cam(true),
        DeviceFormat::new(3840, 2160, 1.0, 30.0).with_max_zoom(10.0),
        DeviceFormat::new(4032, 3024, 1.0, 30.0).with_max_zoom(10.0),
    ])
    .with_min_zoom(0.5)
    .with_capabilities(DeviceCapabilities::full())
}

/// Front true-depth module without smooth zoom
pub fn phone_front_true_depth() -> DeviceDescriptor {
    let mut capabilities = DeviceCapabilities::full();
    capabilities.smooth_zoom = false;
    capabilities.smooth_autofocus = false;

    DeviceDescriptor::new(
        "front-true-depth",
        "Front TrueDepth Camera",
        CameraPosition::Front,
        DeviceKind::TrueDepth,
    )
    .with_formats(vec![
        DeviceFormat::new(1280, 720, 1.0, 60.0)
            .with_max_zoom(4.0)
            .with_multi_cam(true),
        DeviceFormat::new(1080, 1920, 1.0, 30.0)
            .with_max_zoom(4.0)
            .with_multi_cam(true),
        DeviceFormat::new(3088, 2316, 1.0, 30.0).with_max_zoom(4.0),
    ])
    .with_exposure_bias(-4.0, 4.0)
    .with_capabilities(capabilities)
}

/// Plain wide-angle camera with a zoom range of [1, 5] and no ultra-wide
pub fn zoom_limited_back() -> DeviceDescriptor {
    let mut capabilities = DeviceCapabilities::full();
    capabilities.focus_modes = vec![FocusMode::Locked, FocusMode::AutoFocus];
    capabilities.video_stabilization = false;

    DeviceDescriptor::new(
        "back-wide",
        "Back Wide Camera",
        CameraPosition::Back,
        DeviceKind::WideAngle,
    )
    .with_formats(vec![DeviceFormat::new(1920, 1080, 1.0, 30.0).with_max_zoom(5.0)])
    .with_capabilities(capabilities)
}

/// Small wide-angle camera, cheap enough to encode in tests
pub fn small_camera(id: &str, position: CameraPosition, width: u32, height: u32) -> DeviceDescriptor {
    DeviceDescriptor::new(id, id, position, DeviceKind::WideAngle)
        .with_formats(vec![DeviceFormat::new(width, height, 1.0, 30.0)
            .with_max_zoom(4.0)
            .with_multi_cam(true)])
        .with_capabilities(DeviceCapabilities::full())
}

/// Phone with front and back camera that cannot stream both at once
pub fn single_camera_phone() -> SyntheticBackend {
    SyntheticBackend::new(vec![phone_back_triple(), phone_front_true_depth()])
        .with_switch_latency(Duration::from_millis(100))
}

/// Phone whose hardware streams front and back simultaneously
pub fn dual_camera_phone() -> SyntheticBackend {
    SyntheticBackend::new(vec![phone_back_triple(), phone_front_true_depth()]).with_multi_cam(true)
}

/// Laptop-style device with only a back-facing wide camera
pub fn back_only_device() -> SyntheticBackend {
    SyntheticBackend::new(vec![zoom_limited_back()]).with_microphone(false)
}
