//! Tauri plugin exposing the method-call surface
//!
//! ```rust,ignore
//! tauri::Builder::default()
//!     .plugin(duocam::plugin::init())
//!     .run(tauri::generate_context!())
//!     .expect("error while running tauri application");
//! ```
//!
//! The frontend calls `plugin:duocam|invoke` with `{ method, arguments }` and
//! listens for `onVideoRecorded` / `onVideoError`.

use crate::commands::{self, MethodCall, MethodError};
use crate::events::EngineEvent;
use crate::session::CameraEngine;
use serde_json::Value;
use std::sync::Arc;
use tauri::{
    plugin::{Builder, TauriPlugin},
    AppHandle, Emitter, Manager, Runtime, State,
};

struct EngineState(Arc<CameraEngine>);

#[tauri::command]
async fn invoke(
    state: State<'_, EngineState>,
    method: String,
    arguments: Option<Value>,
) -> Result<Value, MethodError> {
    let call = MethodCall::new(method).with_arguments(arguments.unwrap_or(Value::Null));
    commands::dispatch(state.0.clone(), call).await
}

/// Plugin over the default backend and writer
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("duocam")
        .invoke_handler(tauri::generate_handler![invoke])
        .setup(|app, _api| {
            let backend = crate::platform::default_backend()?;
            let engine = Arc::new(CameraEngine::with_backend(backend)?);
            register(app, engine);
            Ok(())
        })
        .build()
}

/// Plugin over an engine the application already built
pub fn init_with<R: Runtime>(engine: Arc<CameraEngine>) -> TauriPlugin<R> {
    Builder::new("duocam")
        .invoke_handler(tauri::generate_handler![invoke])
        .setup(move |app, _api| {
            register(app, engine.clone());
            Ok(())
        })
        .build()
}

fn register<R: Runtime>(app: &AppHandle<R>, engine: Arc<CameraEngine>) {
    if let Some(events) = engine.take_events() {
        let handle = app.clone();
        let forwarder = std::thread::Builder::new()
            .name("duocam-events".to_string())
            .spawn(move || {
                for event in events {
                    let name = event.name();
                    let result = match &event {
                        EngineEvent::VideoRecorded { path } => {
                            handle.emit(name, serde_json::json!({ "path": path }))
                        }
                        EngineEvent::VideoError { message } => {
                            handle.emit(name, serde_json::json!({ "message": message }))
                        }
                    };
                    if let Err(e) = result {
                        log::warn!("Failed to emit {}: {}", name, e);
                    }
                }
            });
        if let Err(e) = forwarder {
            log::warn!("Recording events will not reach the frontend: {}", e);
        }
    }
    app.manage(EngineState(engine));
}
