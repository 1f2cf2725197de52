//! duocam: single and dual camera capture engine
//!
//! Discovers front and back cameras, negotiates formats, runs a capture
//! session on one or two sensors and records a continuous video file across
//! live camera switches.
//!
//! # Features
//! - `native`: desktop cameras through nokhwa
//! - `recording`: H.264/MP4 output through openh264 and muxide
//! - `audio`: microphone capture and an AAC-LC (or Opus) audio track
//! - `tauri-plugin`: Tauri plugin exposing the method-call surface
//!
//! # Usage
//! ```rust,no_run
//! use duocam::{platform, CameraEngine};
//!
//! let engine = CameraEngine::with_backend(platform::default_backend()?)?;
//! engine.init()?;
//! let photo = engine.take_picture()?;
//! engine.start_recording(None)?;
//! engine.switch_camera()?;
//! let video = engine.stop_recording()?;
//! # Ok::<(), duocam::CameraError>(())
//! ```
pub mod commands;
pub mod config;
pub mod context;
pub mod device;
pub mod errors;
pub mod events;
pub mod platform;
pub mod recording;
pub mod session;
pub mod timing;
pub mod types;

#[cfg(feature = "audio")]
pub mod audio;

#[cfg(feature = "tauri-plugin")]
pub mod plugin;

// Testing utilities - synthetic devices for offline testing
pub mod testing;

pub use config::DuocamConfig;
pub use errors::CameraError;
pub use events::{EngineEvent, EventStream};
pub use session::{CameraEngine, SessionPhase, SessionStatus};
pub use types::{CameraPosition, DeviceDescriptor, LiveSwitchPolicy, SessionTopology};

/// Initialize logging for the capture engine
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "duocam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
