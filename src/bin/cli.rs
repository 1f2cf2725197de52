use anyhow::{bail, Context, Result};
use duocam::device::catalog::priority;
use duocam::device::{select_dual, select_single};
use duocam::platform::{self, CaptureBackend};
use duocam::{CameraEngine, CameraPosition, EngineEvent};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const USAGE: &str = "Usage: duocam-cli <devices|negotiate|photo|record <ms> [--switch-at <ms>]> [--dual] [--json]";

fn main() -> Result<()> {
    duocam::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let json = args.iter().any(|a| a == "--json");
    let backend = backend(&args)?;

    match args[1].as_str() {
        "devices" => cmd_devices(backend.as_ref(), json),
        "negotiate" => cmd_negotiate(backend.as_ref(), json),
        "photo" => cmd_photo(backend, json),
        "record" => cmd_record(backend, &args, json),
        other => {
            eprintln!("Unknown command: {}\n{}", other, USAGE);
            std::process::exit(1);
        }
    }
}

/// `--dual` selects the synthetic dual-camera phone
fn backend(args: &[String]) -> Result<Arc<dyn CaptureBackend>> {
    if args.iter().any(|a| a == "--dual") {
        return Ok(Arc::new(duocam::testing::dual_camera_phone()));
    }
    platform::default_backend().context("no camera backend available")
}

fn cmd_devices(backend: &dyn CaptureBackend, json: bool) -> Result<()> {
    let devices: Vec<_> = [CameraPosition::Back, CameraPosition::Front]
        .into_iter()
        .flat_map(|position| backend.discover(position, priority(position)))
        .collect();

    if json {
        println!("{}", serde_json::to_string(&devices)?);
    } else {
        println!("Backend: {} (multi-cam: {})", backend.name(), backend.supports_multi_cam());
        for d in devices {
            println!(
                "{} [{}] {} {:?}, {} formats, up to {:.0} fps",
                d.id,
                d.position.as_str(),
                d.name,
                d.kind,
                d.formats.len(),
                d.max_frame_rate()
            );
        }
    }
    Ok(())
}

fn cmd_negotiate(backend: &dyn CaptureBackend, json: bool) -> Result<()> {
    let back = backend.default_device(CameraPosition::Back);
    let front = backend.default_device(CameraPosition::Front);

    let mut report = serde_json::Map::new();
    for device in back.iter().chain(front.iter()) {
        let choice = select_single(device);
        if !json {
            match &choice {
                Some(c) => println!("{}: {} @ {} fps (format {})", device.id, c.resolution, c.frame_rate, c.format_index),
                None => println!("{}: no usable format", device.id),
            }
        }
        report.insert(
            device.id.clone(),
            serde_json::json!(choice.map(|c| {
                serde_json::json!({
                    "format_index": c.format_index,
                    "resolution": c.resolution,
                    "frame_rate": c.frame_rate,
                })
            })),
        );
    }

    if let (Some(back), Some(front)) = (&back, &front) {
        let dual = select_dual(back, front);
        if !json {
            match &dual {
                Some(d) => println!(
                    "dual: {} @ {} fps ({})",
                    d.output,
                    d.frame_rate,
                    if d.matched { "matched" } else { "baseline" }
                ),
                None => println!("dual: no shared format"),
            }
        }
        report.insert(
            "dual".to_string(),
            serde_json::json!(dual.map(|d| {
                serde_json::json!({
                    "output": d.output,
                    "frame_rate": d.frame_rate,
                    "matched": d.matched,
                })
            })),
        );
    }

    if json {
        println!("{}", serde_json::Value::Object(report));
    }
    Ok(())
}

fn cmd_photo(backend: Arc<dyn CaptureBackend>, json: bool) -> Result<()> {
    let engine = CameraEngine::with_backend(backend)?;
    let path = engine.take_picture().context("photo capture failed")?;
    if json {
        println!("{}", serde_json::json!({ "path": path }));
    } else {
        println!("Photo saved to {}", path.display());
    }
    engine.dispose()?;
    Ok(())
}

fn cmd_record(backend: Arc<dyn CaptureBackend>, args: &[String], json: bool) -> Result<()> {
    // Parse args: record <ms> [--switch-at <ms>]
    let mut duration_ms: Option<u64> = None;
    let mut switch_at: Option<u64> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--switch-at" => {
                i += 1;
                let value = args.get(i).context("--switch-at needs a value")?;
                switch_at = Some(value.parse().context("invalid --switch-at")?);
            }
            "--json" | "--dual" => {}
            value => {
                if duration_ms.is_none() {
                    duration_ms = Some(value.parse().context("invalid duration")?);
                }
            }
        }
        i += 1;
    }
    let Some(duration_ms) = duration_ms else {
        bail!("{}", USAGE);
    };

    let engine = CameraEngine::with_backend(backend)?;
    let events = engine.take_events().context("event stream already taken")?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    let output = engine.start_recording(Some(Duration::from_millis(duration_ms)))?;
    log::info!("Recording to {}", output.display());

    let started = Instant::now();
    let limit = Duration::from_millis(duration_ms) + engine.config().recording.finalize_timeout();
    let mut switched = switch_at.is_none();
    let mut outcome = None;

    while outcome.is_none() && started.elapsed() < limit {
        if interrupted.load(Ordering::SeqCst) {
            eprintln!("Interrupted, finalizing");
            let path = engine.stop_recording()?;
            outcome = Some(path.map(|path| EngineEvent::VideoRecorded { path }));
            break;
        }
        if !switched && started.elapsed() >= Duration::from_millis(switch_at.unwrap_or(0)) {
            let position = engine.switch_camera()?;
            log::info!("Switched to {} camera", position.as_str());
            switched = true;
        }
        if let Some(event) = events.next_timeout(Duration::from_millis(10)) {
            outcome = Some(Some(event));
        } else if !engine.is_recording() {
            // Finalized without an event: nothing was ever written.
            outcome = Some(events.try_next());
        }
    }

    let summary = engine.recorder().last_summary();
    engine.dispose()?;

    match outcome {
        Some(Some(EngineEvent::VideoRecorded { path })) => {
            if json {
                println!("{}", serde_json::json!({ "path": path, "summary": summary }));
            } else {
                println!("Recording saved to {}", path.display());
                if let Some(s) = summary {
                    println!(
                        "{} frames ({} filler), {} audio chunks, {} dropped, {:.2}s",
                        s.video_frames, s.filler_frames, s.audio_chunks, s.dropped_samples, s.duration_secs
                    );
                }
            }
            Ok(())
        }
        Some(Some(EngineEvent::VideoError { message })) => bail!("recording failed: {}", message),
        Some(None) => {
            println!("Recording discarded, no frames arrived");
            Ok(())
        }
        None => bail!("recording did not finish in time"),
    }
}
