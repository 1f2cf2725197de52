//! Shared fixtures for the integration tests
#![allow(dead_code)]

use duocam::platform::SyntheticBackend;
use duocam::recording::TimelineWriterFactory;
use duocam::testing::small_camera;
use duocam::{CameraEngine, CameraPosition, DuocamConfig, LiveSwitchPolicy};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Front and back 320x240 cameras, cheap enough for recording tests
pub fn small_phone() -> SyntheticBackend {
    SyntheticBackend::new(vec![
        small_camera("back-small", CameraPosition::Back, 320, 240),
        small_camera("front-small", CameraPosition::Front, 320, 240),
    ])
    .with_switch_latency(Duration::from_millis(100))
}

pub fn config_for(dir: &Path) -> DuocamConfig {
    let mut config = DuocamConfig::default();
    config.storage.output_directory = dir.to_string_lossy().into_owned();
    config
}

pub fn engine(backend: SyntheticBackend, factory: &TimelineWriterFactory, dir: &Path) -> CameraEngine {
    engine_with_config(backend, factory, config_for(dir))
}

pub fn engine_with_policy(
    backend: SyntheticBackend,
    factory: &TimelineWriterFactory,
    dir: &Path,
    policy: LiveSwitchPolicy,
) -> CameraEngine {
    let mut config = config_for(dir);
    config.session.live_switch = policy;
    engine_with_config(backend, factory, config)
}

pub fn engine_with_config(
    backend: SyntheticBackend,
    factory: &TimelineWriterFactory,
    config: DuocamConfig,
) -> CameraEngine {
    CameraEngine::new(Arc::new(backend), Arc::new(factory.clone()), config)
        .expect("engine should start")
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
