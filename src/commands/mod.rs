//! Method-call request surface
//!
//! Each call is a method name plus a JSON object of arguments. Results are
//! JSON values; failures carry a per-method code and a readable message.

use crate::errors::CameraError;
use crate::session::CameraEngine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const METHODS: [&str; 15] = [
    "initCamera",
    "takePicture",
    "switchCamera",
    "setFlash",
    "setZoom",
    "setBrightness",
    "getAvailableZoomLevels",
    "optimizeCamera",
    "pauseCamera",
    "resumeCamera",
    "disposeCamera",
    "startVideoRecording",
    "stopVideoRecording",
    "cancelVideoRecording",
    "supportsLiveSwitch",
];

/// One request from the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arguments: Value::Null,
        }
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name).filter(|v| !v.is_null())
    }
}

/// Failure reported back across the method-call boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodError {
    pub code: String,
    pub message: String,
}

impl MethodError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    fn from_error(code: &str, err: CameraError) -> Self {
        Self::new(code, err.to_string())
    }
}

impl std::fmt::Display for MethodError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for MethodError {}

pub type MethodResult = Result<Value, MethodError>;

/// Dispatch on a blocking thread so async callers never wait on the session context
pub async fn dispatch(engine: Arc<CameraEngine>, call: MethodCall) -> MethodResult {
    let method = call.method.clone();
    match tokio::task::spawn_blocking(move || handle(&engine, &call)).await {
        Ok(result) => result,
        Err(e) => Err(MethodError::new(
            "INTERNAL_ERROR",
            format!("{} did not complete: {}", method, e),
        )),
    }
}

/// Run one call to completion on the current thread
pub fn handle(engine: &CameraEngine, call: &MethodCall) -> MethodResult {
    log::debug!("Method call {}", call.method);
    match call.method.as_str() {
        "initCamera" => engine
            .init()
            .map(|_| json!(true))
            .map_err(|e| MethodError::from_error("INIT_ERROR", e)),
        "takePicture" => engine
            .take_picture()
            .map(|path| json!(path.to_string_lossy()))
            .map_err(|e| MethodError::from_error("CAPTURE_ERROR", e)),
        "switchCamera" => match engine.switch_camera() {
            Ok(position) => Ok(json!(format!("Switched to {} camera", position.as_str()))),
            Err(e @ CameraError::DeviceUnavailable)
            | Err(e @ CameraError::SwitchNotSupportedWhileRecording) => {
                Err(MethodError::from_error(e.kind_name(), e))
            }
            Err(e) => Err(MethodError::from_error("SWITCH_ERROR", e)),
        },
        "setFlash" => {
            let on = call
                .argument("isOn")
                .and_then(Value::as_bool)
                .ok_or_else(|| MethodError::new("INVALID_ARGS", "isOn must be a boolean"))?;
            engine
                .set_flash(on)
                .map(|_| json!(if on { "Flash on" } else { "Flash off" }))
                .map_err(|e| MethodError::from_error("FLASH_ERROR", e))
        }
        "setZoom" => {
            let zoom = number_argument(call, "zoomValue")?;
            engine
                .set_zoom(zoom)
                .map(|applied| json!(format!("Zoom set to {:.2}", applied)))
                .map_err(|e| MethodError::from_error("ZOOM_ERROR", e))
        }
        "setBrightness" => {
            let bias = bias_argument(call)?;
            engine
                .set_brightness(bias)
                .map(|applied| json!(format!("Brightness set to {:.2}", applied)))
                .map_err(|e| MethodError::from_error("BRIGHTNESS_ERROR", e))
        }
        "getAvailableZoomLevels" => Ok(json!(engine
            .available_zoom_levels()
            .unwrap_or_else(|_| vec![1.0]))),
        "optimizeCamera" => engine
            .optimize_for_capture()
            .map(|enabled| json!(format!("Enabled {} continuous modes", enabled)))
            .map_err(|e| MethodError::from_error("OPTIMIZE_ERROR", e)),
        "pauseCamera" => {
            if let Err(e) = engine.pause() {
                log::warn!("Pause failed: {}", e);
            }
            Ok(json!("Camera paused"))
        }
        "resumeCamera" => engine
            .resume()
            .map(|_| json!("Camera resumed"))
            .map_err(|e| MethodError::from_error("RESUME_ERROR", e)),
        "disposeCamera" => {
            if let Err(e) = engine.dispose() {
                log::warn!("Dispose failed: {}", e);
            }
            Ok(json!("Camera disposed"))
        }
        "startVideoRecording" => {
            let max_duration = max_duration_argument(call)?;
            engine
                .start_recording(max_duration)
                .map(|_| json!(true))
                .map_err(|e| MethodError::from_error("RECORDING_ERROR", e))
        }
        "stopVideoRecording" => engine
            .stop_recording()
            .map(|path| match path {
                Some(path) => json!(path.to_string_lossy()),
                None => json!(""),
            })
            .map_err(|e| MethodError::from_error("STOP_ERROR", e)),
        "cancelVideoRecording" => engine
            .cancel_recording()
            .map(|_| json!(""))
            .map_err(|e| MethodError::from_error("CANCEL_ERROR", e)),
        "supportsLiveSwitch" => Ok(json!(engine.supports_live_switch().unwrap_or(false))),
        other => Err(MethodError::new(
            "NOT_IMPLEMENTED",
            format!("Unknown method: {}", other),
        )),
    }
}

fn number_argument(call: &MethodCall, name: &str) -> Result<f64, MethodError> {
    call.argument(name)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .ok_or_else(|| MethodError::new("INVALID_ARGS", format!("{} must be a number", name)))
}

/// `value` must fit an `f32` exposure bias
fn bias_argument(call: &MethodCall) -> Result<f32, MethodError> {
    let value = number_argument(call, "value")?;
    if value.abs() > f32::MAX as f64 {
        return Err(MethodError::new("INVALID_ARGS", "value is out of range"));
    }
    Ok(value as f32)
}

/// Positive `maxDurationMs` limits the recording; absent or non-positive does not
fn max_duration_argument(call: &MethodCall) -> Result<Option<Duration>, MethodError> {
    match call.argument("maxDurationMs") {
        None => Ok(None),
        Some(value) => {
            let ms = value
                .as_f64()
                .ok_or_else(|| MethodError::new("INVALID_ARGS", "maxDurationMs must be a number"))?;
            Ok((ms > 0.0).then(|| Duration::from_millis(ms as u64)))
        }
    }
}
