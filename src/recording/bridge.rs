//! Filler frames across a single-camera input swap
//!
//! While the outgoing camera has stopped and the incoming one has not started,
//! the recording receives a short run of solid frames at the negotiated rate.
//! Their timestamps continue from the last real frame, so the timeline stays
//! monotonic and gap-free.

use crate::types::{CameraPosition, FrameKind, VideoSample};
use std::sync::Arc;
use std::time::Duration;

/// Cached solid frame sized to the encoder
#[derive(Debug, Clone)]
pub struct FillerFrame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl FillerFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_colour(width, height, [0, 0, 0])
    }

    pub fn with_colour(width: u32, height: u32, colour: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let data: Vec<u8> = colour.iter().copied().cycle().take(pixels * 3).collect();
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Filler sample at `pts`, attributed to `source`
    pub fn sample(&self, source: CameraPosition, pts: Duration) -> VideoSample {
        VideoSample {
            source,
            pts,
            width: self.width,
            height: self.height,
            data: self.data.clone(),
            kind: FrameKind::Filler,
        }
    }
}

/// Frames needed to cover `window` at `frame` spacing
pub fn filler_count(window: Duration, frame: Duration) -> usize {
    if frame.is_zero() || window.is_zero() {
        return 0;
    }
    let frames = window.as_secs_f64() / frame.as_secs_f64();
    // Tolerate float noise so 150ms at 40ms spacing stays 4 frames, not 5.
    (frames - 1e-9).ceil().max(0.0) as usize
}

/// Timestamps of the bridge run that follows `last`
pub fn filler_timestamps(last: Duration, window: Duration, frame: Duration) -> Vec<Duration> {
    (1..=filler_count(window, frame) as u32)
        .map(|i| last + frame * i)
        .collect()
}
