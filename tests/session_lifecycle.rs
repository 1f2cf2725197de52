//! Session configuration, controls and teardown over synthetic hardware

mod common;

use common::{engine, small_phone};
use duocam::commands::{handle, MethodCall};
use duocam::platform::SyntheticBackend;
use duocam::recording::TimelineWriterFactory;
use duocam::testing::{back_only_device, dual_camera_phone, single_camera_phone, zoom_limited_back};
use duocam::types::FlashMode;
use duocam::{CameraError, CameraPosition, SessionPhase, SessionTopology};
use serde_json::json;
use std::thread::sleep;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn zoom_levels_for_limited_device() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let engine = engine(back_only_device(), &factory, dir.path());

    let reply = handle(&engine, &MethodCall::new("getAvailableZoomLevels")).unwrap();
    assert_eq!(reply, json!([1.0]));

    engine.init().unwrap();
    let reply = handle(&engine, &MethodCall::new("getAvailableZoomLevels")).unwrap();
    assert_eq!(reply, json!([1.0, 2.0, 3.0]));
}

#[test]
fn zoom_levels_include_ultra_wide() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let engine = engine(single_camera_phone(), &factory, dir.path());

    engine.init().unwrap();
    assert_eq!(engine.available_zoom_levels().unwrap(), vec![0.5, 1.0, 2.0]);
}

#[test]
fn flash_falls_back_when_unsupported() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let backend = SyntheticBackend::new(vec![zoom_limited_back()]).with_flash_modes(vec![FlashMode::Off]);
    let inspector = backend.inspector();
    let engine = engine(backend, &factory, dir.path());

    handle(&engine, &MethodCall::new("setFlash").with_arguments(json!({ "isOn": true }))).unwrap();
    let path = engine.take_picture().unwrap();

    assert!(path.exists());
    assert_eq!(inspector.last_photo_settings().unwrap().flash, FlashMode::Off);
}

#[test]
fn flash_used_when_supported() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let backend = single_camera_phone();
    let inspector = backend.inspector();
    let engine = engine(backend, &factory, dir.path());

    engine.set_flash(true).unwrap();
    engine.take_picture().unwrap();
    assert_eq!(inspector.last_photo_settings().unwrap().flash, FlashMode::On);
}

#[test]
fn photo_is_a_jpeg_in_the_output_directory() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let engine = engine(single_camera_phone(), &factory, dir.path());

    let path = engine.take_picture().unwrap();
    assert_eq!(path.parent(), Some(dir.path()));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    assert!(image::load_from_memory(&bytes).is_ok());
}

#[test]
fn photo_hardware_failure_is_capture_error() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let backend = single_camera_phone();
    let inspector = backend.inspector();
    let engine = engine(backend, &factory, dir.path());

    engine.init().unwrap();
    inspector.set_fail_photo(true);
    let err = handle(&engine, &MethodCall::new("takePicture")).unwrap_err();
    assert_eq!(err.code, "CAPTURE_ERROR");
    assert!(matches!(engine.take_picture(), Err(CameraError::CaptureFailed(_))));
}

#[test]
fn dual_switch_keeps_both_inputs() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let backend = dual_camera_phone();
    let inspector = backend.inspector();
    let engine = engine(backend, &factory, dir.path());

    engine.init().unwrap();
    let inputs = engine.attached_inputs().unwrap();
    let added = inspector.inputs_added();
    assert_eq!(inputs.len(), 2);

    assert_eq!(engine.switch_camera().unwrap(), CameraPosition::Front);
    assert_eq!(engine.switch_camera().unwrap(), CameraPosition::Back);
    assert_eq!(engine.attached_inputs().unwrap(), inputs);
    assert_eq!(inspector.inputs_added(), added);
    assert_eq!(inspector.inputs_removed(), 0);
}

#[test]
fn single_switch_replaces_the_input() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let backend = single_camera_phone();
    let inspector = backend.inspector();
    let engine = engine(backend, &factory, dir.path());

    engine.init().unwrap();
    let before = engine.attached_inputs().unwrap();
    assert_eq!(engine.switch_camera().unwrap(), CameraPosition::Front);

    let after = engine.attached_inputs().unwrap();
    assert_eq!(after.len(), 1);
    assert_ne!(after, before);
    assert_eq!(inspector.inputs_removed(), 1);
    assert!(engine.supports_live_switch().unwrap());
}

#[test]
fn switch_without_second_camera_reports_device_unavailable() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let engine = engine(back_only_device(), &factory, dir.path());

    engine.init().unwrap();
    let err = handle(&engine, &MethodCall::new("switchCamera")).unwrap_err();
    assert_eq!(err.code, "DEVICE_UNAVAILABLE");
    assert!(!engine.supports_live_switch().unwrap());
}

#[test]
fn zoom_and_brightness_are_clamped() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let engine = engine(back_only_device(), &factory, dir.path());

    engine.init().unwrap();
    assert_eq!(engine.set_zoom(0.25).unwrap(), 1.0);
    assert_eq!(engine.set_zoom(12.0).unwrap(), 5.0);
    assert_eq!(engine.set_zoom(2.5).unwrap(), 2.5);
    assert_eq!(engine.set_brightness(-10.0).unwrap(), -8.0);

    let state = engine.status().unwrap().device_state.unwrap();
    assert_eq!(state.zoom_factor, 2.5);
    assert_eq!(state.exposure_bias, -8.0);
}

#[test]
fn controls_before_init_report_unavailable() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let engine = engine(single_camera_phone(), &factory, dir.path());

    assert!(matches!(engine.set_zoom(2.0), Err(CameraError::DeviceUnavailable)));
    let err = handle(&engine, &MethodCall::new("setZoom").with_arguments(json!({ "zoomValue": 2.0 })))
        .unwrap_err();
    assert_eq!(err.code, "ZOOM_ERROR");
}

#[test]
fn device_locks_are_always_released() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let backend = single_camera_phone();
    let inspector = backend.inspector();
    let engine = engine(backend, &factory, dir.path());

    engine.init().unwrap();
    engine.set_zoom(2.0).unwrap();
    engine.set_brightness(1.0).unwrap();
    engine.optimize_for_capture().unwrap();
    engine.switch_camera().unwrap();

    inspector.set_fail_lock(true);
    assert!(engine.set_zoom(3.0).is_err());
    assert!(engine.optimize_for_capture().is_err());
    inspector.set_fail_lock(false);

    assert!(inspector.locks_acquired() > 0);
    assert_eq!(inspector.locks_acquired(), inspector.locks_released());
}

#[test]
fn pause_and_resume_keep_configuration() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let backend = single_camera_phone();
    let inspector = backend.inspector();
    let engine = engine(backend, &factory, dir.path());

    engine.init().unwrap();
    let inputs = engine.attached_inputs().unwrap();
    handle(&engine, &MethodCall::new("pauseCamera")).unwrap();
    assert_eq!(engine.status().unwrap().phase, SessionPhase::Paused);

    handle(&engine, &MethodCall::new("resumeCamera")).unwrap();
    assert_eq!(engine.status().unwrap().phase, SessionPhase::Running);
    assert_eq!(engine.attached_inputs().unwrap(), inputs);
    assert_eq!(inspector.sessions_created(), 1);
}

#[test]
fn dispose_is_idempotent_and_releases_hardware() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let backend = small_phone();
    let inspector = backend.inspector();
    let engine = engine(backend, &factory, dir.path());

    let output = engine.start_recording(None).unwrap();
    sleep(Duration::from_millis(100));

    engine.dispose().unwrap();
    engine.dispose().unwrap();
    assert!(!engine.is_recording());
    assert!(engine.attached_inputs().unwrap().is_empty());
    assert_eq!(engine.status().unwrap().phase, SessionPhase::Unconfigured);
    assert!(common::wait_for(Duration::from_secs(2), || !output.exists()));

    let delivered = inspector.video_delivered();
    sleep(Duration::from_millis(100));
    assert_eq!(inspector.video_delivered(), delivered);

    engine.init().unwrap();
    assert_eq!(inspector.sessions_created(), 2);
}

#[test]
fn disconnected_device_is_rediscovered() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let backend = single_camera_phone();
    let inspector = backend.inspector();
    let engine = engine(backend, &factory, dir.path());

    engine.init().unwrap();
    engine.dispose().unwrap();

    inspector.disconnect("back-triple");
    engine.init().unwrap();
    let status = engine.status().unwrap();
    assert_eq!(status.topology, Some(SessionTopology::SingleCamera));
    assert_eq!(status.active_position, Some(CameraPosition::Front));
}

#[test]
fn no_cameras_fails_configuration_cleanly() {
    let dir = tempdir().unwrap();
    let factory = TimelineWriterFactory::new();
    let engine = engine(SyntheticBackend::new(Vec::new()), &factory, dir.path());

    assert!(matches!(engine.init(), Err(CameraError::DeviceUnavailable)));
    let err = handle(&engine, &MethodCall::new("initCamera")).unwrap_err();
    assert_eq!(err.code, "INIT_ERROR");
    assert_eq!(engine.status().unwrap().phase, SessionPhase::Unconfigured);
}
