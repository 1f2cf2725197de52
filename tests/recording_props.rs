//! Property-Based Tests for duocam recording and negotiation
//!
//! These tests verify invariants of zoom clamping, format negotiation, bridge
//! timing and the recorded timeline using proptest for input generation and
//! shrinking.
//!
//! Run with: cargo test --test recording_props

mod common;

use duocam::device::format::{select_single, MIN_FPS, SINGLE_FPS_CAP};
use duocam::recording::{filler_timestamps, TimelineWriterFactory};
use duocam::session::{clamp_zoom, zoom_levels};
use duocam::testing::synthetic_video_sample;
use duocam::types::{CameraPosition, DeviceDescriptor, DeviceFormat, DeviceKind};
use proptest::prelude::*;
use std::time::Duration;
use tempfile::tempdir;

fn device_with(formats: Vec<DeviceFormat>) -> DeviceDescriptor {
    DeviceDescriptor::new("prop", "prop", CameraPosition::Back, DeviceKind::WideAngle).with_formats(formats)
}

fn format_strategy() -> impl Strategy<Value = DeviceFormat> {
    ((1u32..120), (1u32..68), 5.0f64..120.0)
        .prop_map(|(w, h, max_fps)| DeviceFormat::new(w * 16, h * 16, 1.0, max_fps))
}

// ═══════════════════════════════════════════════════════════════════════════
// ZOOM INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// Applied zoom never leaves [1, max]
    #[test]
    fn zoom_is_clamped(requested in -10.0f64..50.0, max in 1.0f64..20.0) {
        let applied = clamp_zoom(requested, max);
        prop_assert!((1.0..=max).contains(&applied));
        prop_assert_eq!(clamp_zoom(applied, max), applied);
    }

    /// Offered levels are sorted, unique, in range and at most three
    #[test]
    fn zoom_levels_are_bounded(min in 0.3f64..2.0, span in 0.0f64..15.0) {
        let max = min + span;
        let levels = zoom_levels(min, max);
        prop_assert!(!levels.is_empty());
        prop_assert!(levels.len() <= 3);
        prop_assert!(levels.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(levels.iter().all(|z| *z >= min - 1e-9 && *z <= max + 1e-9));
        prop_assert_eq!(levels[0], min);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// NEGOTIATION INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// Single-camera choice is the largest usable format at a supported rate
    #[test]
    fn single_choice_is_largest_usable(formats in prop::collection::vec(format_strategy(), 0..8)) {
        let device = device_with(formats.clone());
        match select_single(&device) {
            Some(choice) => {
                let chosen = &formats[choice.format_index];
                prop_assert_eq!(chosen.resolution, choice.resolution);
                prop_assert!(chosen.supports_fps(choice.frame_rate));
                prop_assert!(choice.frame_rate >= MIN_FPS && choice.frame_rate <= SINGLE_FPS_CAP);
                for format in formats.iter().filter(|f| f.max_fps() >= MIN_FPS) {
                    prop_assert!(format.resolution.area() <= choice.resolution.area());
                }
            }
            None => prop_assert!(formats.iter().all(|f| f.max_fps() < MIN_FPS)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// BRIDGE TIMING INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// Filler run continues strictly after the last frame and covers the window
    #[test]
    fn filler_run_covers_window(last_ms in 0u64..60_000, window_ms in 0u64..500, frame_ms in 10u64..100) {
        let last = Duration::from_millis(last_ms);
        let window = Duration::from_millis(window_ms);
        let frame = Duration::from_millis(frame_ms);
        let stamps = filler_timestamps(last, window, frame);

        prop_assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(stamps.iter().all(|pts| *pts > last));
        match stamps.last() {
            Some(end) => {
                prop_assert!(*end - last >= window);
                prop_assert!(*end - last < window + frame);
            }
            None => prop_assert_eq!(window_ms, 0),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TIMELINE INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Only strictly newer samples of the active camera reach the file
    #[test]
    fn recorded_timeline_is_monotonic(
        samples in prop::collection::vec((0u64..2_000, any::<bool>()), 1..40)
    ) {
        let dir = tempdir().unwrap();
        let factory = TimelineWriterFactory::new();
        let backend = common::small_phone();
        let inspector = backend.inspector();
        let engine = common::engine(backend, &factory, dir.path());

        engine.init().unwrap();
        inspector.hold_frames(true);
        engine.start_recording(None).unwrap();

        let recorder = engine.recorder().clone();
        for (i, (pts_ms, back)) in samples.iter().enumerate() {
            let source = if *back { CameraPosition::Back } else { CameraPosition::Front };
            let pts = Duration::from_millis(*pts_ms);
            recorder.append_video(synthetic_video_sample(i as u64, 16, 16, source, pts));
        }
        let finished = engine.stop_recording().unwrap();

        let mut expected: Vec<u64> = Vec::new();
        for (pts_ms, back) in &samples {
            if *back && expected.last().map_or(true, |last| pts_ms > last) {
                expected.push(*pts_ms);
            }
        }

        match expected.first().copied() {
            None => prop_assert!(finished.is_none()),
            Some(anchor) => {
                prop_assert!(finished.is_some());
                let timeline = factory.last_finished().unwrap();
                prop_assert!(timeline.is_monotonic());
                prop_assert!(timeline.video.iter().all(|v| v.source == CameraPosition::Back));
                let recorded: Vec<u64> = timeline.video.iter().map(|v| v.pts_us).collect();
                let expected_us: Vec<u64> = expected.iter().map(|ms| (ms - anchor) * 1000).collect();
                prop_assert_eq!(recorded, expected_us);
            }
        }
    }
}
