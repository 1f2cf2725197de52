//! Format and frame-rate negotiation
//!
//! Selection is pure logic over [`DeviceDescriptor`]s. Only [`apply_format`]
//! touches hardware, and it does so through a configuration lock that is
//! released on every exit path.

use crate::errors::CameraError;
use crate::platform::{configuration_error, CaptureGraph};
use crate::types::{DeviceDescriptor, DeviceFormat, Resolution};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;

/// Formats slower than this are never selected
pub const MIN_FPS: f64 = 15.0;
pub const SINGLE_FPS_CAP: f64 = 60.0;
pub const DUAL_FPS_CAP: f64 = 30.0;
pub const FPS_TIERS: [f64; 4] = [60.0, 30.0, 24.0, 15.0];

/// Operating point used when two devices share no resolution
pub const BASELINE_RESOLUTION: Resolution = Resolution::new(1280, 720);
pub const BASELINE_FPS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormatChoice {
    pub format_index: usize,
    pub resolution: Resolution,
    pub frame_rate: f64,
}

/// Negotiated formats of a dual-camera session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DualFormatChoice {
    pub back: FormatChoice,
    pub front: FormatChoice,
    /// Size of the recorded stream
    pub output: Resolution,
    pub frame_rate: f64,
    /// False when the baseline was used because no resolution is shared
    pub matched: bool,
}

/// Highest rate not above `cap` that the format accepts
fn best_rate(format: &DeviceFormat, cap: f64) -> Option<f64> {
    let capped = format.max_fps().min(cap);
    if capped >= MIN_FPS && format.supports_fps(capped) {
        return Some(capped);
    }
    FPS_TIERS
        .iter()
        .copied()
        .filter(|tier| *tier <= cap)
        .find(|tier| format.supports_fps(*tier))
}

fn usable(format: &DeviceFormat) -> bool {
    format.max_fps() >= MIN_FPS
}

/// Largest-area format with at least 15 fps, at up to 60 fps
pub fn select_single(device: &DeviceDescriptor) -> Option<FormatChoice> {
    select_with_cap(device, SINGLE_FPS_CAP)
}

fn select_with_cap(device: &DeviceDescriptor, cap: f64) -> Option<FormatChoice> {
    let mut best: Option<(FormatChoice, f64)> = None;
    for (index, format) in device.formats.iter().enumerate() {
        if !usable(format) {
            continue;
        }
        let Some(rate) = best_rate(format, cap) else {
            continue;
        };
        let better = match &best {
            None => true,
            Some((current, current_max)) => {
                let area = format.resolution.area();
                area > current.resolution.area()
                    || (area == current.resolution.area() && format.max_fps() > *current_max)
            }
        };
        if better {
            best = Some((
                FormatChoice {
                    format_index: index,
                    resolution: format.resolution,
                    frame_rate: rate,
                },
                format.max_fps(),
            ));
        }
    }
    best.map(|(choice, _)| choice)
}

fn multi_cam_formats(device: &DeviceDescriptor) -> impl Iterator<Item = (usize, &DeviceFormat)> {
    device
        .formats
        .iter()
        .enumerate()
        .filter(|(_, f)| f.multi_cam_supported && usable(f))
}

/// Max fps over every multi-cam format of one normalized resolution
fn max_fps_at(device: &DeviceDescriptor, mode: (u32, u32)) -> f64 {
    multi_cam_formats(device)
        .filter(|(_, f)| f.resolution.normalized() == mode)
        .map(|(_, f)| f.max_fps())
        .fold(0.0, f64::max)
}

/// Format of `device` at `mode` that runs at `fps`
fn format_at(device: &DeviceDescriptor, mode: (u32, u32), fps: f64) -> Option<FormatChoice> {
    multi_cam_formats(device)
        .find(|(_, f)| f.resolution.normalized() == mode && f.supports_fps(fps))
        .map(|(index, f)| FormatChoice {
            format_index: index,
            resolution: f.resolution,
            frame_rate: fps,
        })
}

fn mutual_rate(back: &DeviceDescriptor, front: &DeviceDescriptor, mode: (u32, u32)) -> Option<f64> {
    let supported = |fps: f64| format_at(back, mode, fps).is_some() && format_at(front, mode, fps).is_some();

    let mutual_max = max_fps_at(back, mode).min(max_fps_at(front, mode));
    if mutual_max >= 29.0 && supported(30.0) {
        return Some(30.0);
    }
    if let Some(tier) = FPS_TIERS
        .iter()
        .copied()
        .filter(|tier| *tier <= DUAL_FPS_CAP && *tier <= mutual_max + 0.01)
        .find(|tier| supported(*tier))
    {
        return Some(tier);
    }
    let capped = mutual_max.min(DUAL_FPS_CAP);
    supported(capped).then_some(capped)
}

/// Normalized modes both cameras can stream together, largest area first, each once
fn common_modes(back: &DeviceDescriptor, front: &DeviceDescriptor) -> Vec<(u32, u32)> {
    let front_modes: HashSet<(u32, u32)> = multi_cam_formats(front)
        .map(|(_, f)| f.resolution.normalized())
        .collect();

    let mut common: Vec<(u32, u32)> = multi_cam_formats(back)
        .map(|(_, f)| f.resolution.normalized())
        .filter(|mode| front_modes.contains(mode))
        .collect();
    common.sort_by_key(|&(w, h)| (Reverse(w as u64 * h as u64), (w, h)));
    common.dedup();
    common
}

/// Common operating point of the back and front camera
pub fn select_dual(back: &DeviceDescriptor, front: &DeviceDescriptor) -> Option<DualFormatChoice> {
    for mode in common_modes(back, front) {
        let Some(rate) = mutual_rate(back, front, mode) else {
            continue;
        };
        if let (Some(back_choice), Some(front_choice)) =
            (format_at(back, mode, rate), format_at(front, mode, rate))
        {
            log::info!(
                "Dual format negotiated: {}@{}fps",
                back_choice.resolution,
                rate
            );
            return Some(DualFormatChoice {
                back: back_choice,
                front: front_choice,
                output: back_choice.resolution,
                frame_rate: rate,
                matched: true,
            });
        }
    }

    dual_baseline(back, front)
}

/// No shared resolution: best back format, front closest to the baseline
fn dual_baseline(back: &DeviceDescriptor, front: &DeviceDescriptor) -> Option<DualFormatChoice> {
    let back_choice = select_with_cap(back, DUAL_FPS_CAP)?;

    let baseline_area = BASELINE_RESOLUTION.area() as i64;
    let front_choice = front
        .formats
        .iter()
        .enumerate()
        .filter(|(_, f)| usable(f))
        .filter_map(|(index, f)| {
            best_rate(f, DUAL_FPS_CAP).map(|rate| FormatChoice {
                format_index: index,
                resolution: f.resolution,
                frame_rate: rate,
            })
        })
        .min_by_key(|choice| (choice.resolution.area() as i64 - baseline_area).abs())?;

    log::warn!(
        "No common dual-camera resolution; using {} baseline",
        BASELINE_RESOLUTION
    );
    Some(DualFormatChoice {
        back: back_choice,
        front: front_choice,
        output: BASELINE_RESOLUTION,
        frame_rate: BASELINE_FPS,
        matched: false,
    })
}

/// Make `choice` the active format of an attached device
pub fn apply_format(
    graph: &mut dyn CaptureGraph,
    device_id: &str,
    choice: &FormatChoice,
) -> Result<(), CameraError> {
    let mut lock = graph
        .lock_device(device_id)
        .map_err(|e| configuration_error("device lock", e))?;
    lock.set_active_format(choice.format_index)
        .map_err(|e| configuration_error("active format", e))?;
    lock.set_frame_rate(choice.frame_rate)
        .map_err(|e| configuration_error("frame rate", e))?;
    log::debug!(
        "Applied {}@{}fps to {}",
        choice.resolution,
        choice.frame_rate,
        device_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CameraPosition, DeviceKind, FrameRateRange};

    fn device(formats: Vec<DeviceFormat>) -> DeviceDescriptor {
        DeviceDescriptor::new("d", "d", CameraPosition::Back, DeviceKind::WideAngle)
            .with_formats(formats)
    }

    #[test]
    fn test_single_picks_largest_area_at_usable_rate() {
        let d = device(vec![
            DeviceFormat::new(1920, 1080, 1.0, 60.0),
            DeviceFormat::new(4032, 3024, 1.0, 10.0),
            DeviceFormat::new(3840, 2160, 1.0, 30.0),
        ]);
        let choice = select_single(&d).unwrap();
        assert_eq!(choice.format_index, 2);
        assert_eq!(choice.frame_rate, 30.0);
    }

    #[test]
    fn test_single_caps_at_sixty() {
        let d = device(vec![DeviceFormat::new(1280, 720, 1.0, 240.0)]);
        assert_eq!(select_single(&d).unwrap().frame_rate, 60.0);
    }

    #[test]
    fn test_common_modes_unique_when_areas_tie() {
        // 1600x900 and 1200x1200 share an area of 1.44 MP.
        let formats = || {
            vec![
                DeviceFormat::new(1600, 900, 1.0, 30.0).with_multi_cam(true),
                DeviceFormat::new(1200, 1200, 1.0, 30.0).with_multi_cam(true),
                DeviceFormat::new(900, 1600, 1.0, 60.0).with_multi_cam(true),
                DeviceFormat::new(1200, 1200, 1.0, 60.0).with_multi_cam(true),
            ]
        };
        let modes = common_modes(&device(formats()), &device(formats()));
        assert_eq!(modes, vec![(1200, 1200), (1600, 900)]);
    }

    #[test]
    fn test_single_none_when_all_slow() {
        let d = device(vec![DeviceFormat::new(4032, 3024, 1.0, 10.0)]);
        assert!(select_single(&d).is_none());
    }

    #[test]
    fn test_dual_matches_rotated_resolutions() {
        let back = device(vec![
            DeviceFormat::new(1920, 1080, 1.0, 60.0).with_multi_cam(true),
            DeviceFormat::new(3840, 2160, 1.0, 30.0),
        ]);
        let front = device(vec![
            DeviceFormat::new(1080, 1920, 1.0, 30.0).with_multi_cam(true),
            DeviceFormat::new(1280, 720, 1.0, 30.0).with_multi_cam(true),
        ]);
        let choice = select_dual(&back, &front).unwrap();
        assert!(choice.matched);
        assert_eq!(choice.output, Resolution::new(1920, 1080));
        assert_eq!(choice.front.format_index, 0);
        assert_eq!(choice.frame_rate, 30.0);
    }

    #[test]
    fn test_dual_rounds_down_to_tier() {
        let mut slow = DeviceFormat::new(1280, 720, 1.0, 24.0).with_multi_cam(true);
        slow.frame_rate_ranges = vec![FrameRateRange::new(15.0, 26.0)];
        let back = device(vec![slow]);
        let front = device(vec![DeviceFormat::new(1280, 720, 1.0, 30.0).with_multi_cam(true)]);
        assert_eq!(select_dual(&back, &front).unwrap().frame_rate, 24.0);
    }

    #[test]
    fn test_dual_falls_back_to_baseline() {
        let back = device(vec![DeviceFormat::new(4032, 3024, 1.0, 30.0).with_multi_cam(true)]);
        let front = device(vec![
            DeviceFormat::new(640, 480, 1.0, 30.0).with_multi_cam(true),
            DeviceFormat::new(1280, 960, 1.0, 30.0).with_multi_cam(true),
        ]);
        let choice = select_dual(&back, &front).unwrap();
        assert!(!choice.matched);
        assert_eq!(choice.output, BASELINE_RESOLUTION);
        assert_eq!(choice.frame_rate, BASELINE_FPS);
        assert_eq!(choice.back.format_index, 0);
        assert_eq!(choice.front.resolution, Resolution::new(1280, 960));
    }
}
