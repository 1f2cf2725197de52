//! Presentation clock shared by every delivery context
//!
//! Video and audio delivery threads stamp samples from one `PTSClock` so the
//! recorder can interleave them on a single timebase.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic clock for presentation timestamps
#[derive(Debug, Clone)]
pub struct PTSClock {
    start: Arc<Instant>,
}

impl PTSClock {
    /// Create a new PTS clock with the current instant as time zero
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Create a PTS clock from an existing start instant
    pub fn from_instant(start: Instant) -> Self {
        Self {
            start: Arc::new(start),
        }
    }

    /// Elapsed time since clock creation
    #[inline]
    pub fn now(&self) -> Duration {
        self.start.elapsed()
    }

    /// Presentation time of a given instant, saturating at zero
    #[inline]
    pub fn at(&self, instant: Instant) -> Duration {
        instant.saturating_duration_since(*self.start)
    }

    pub fn start_instant(&self) -> Instant {
        *self.start
    }
}

impl Default for PTSClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Duration of one frame at the given rate
pub fn frame_duration(fps: f64) -> Duration {
    if fps <= 0.0 {
        return Duration::from_millis(33);
    }
    Duration::from_secs_f64(1.0 / fps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clock_monotonic() {
        let clock = PTSClock::new();
        let first = clock.now();
        thread::sleep(Duration::from_millis(5));
        assert!(clock.now() > first);
    }

    #[test]
    fn test_shared_start() {
        let clock = PTSClock::new();
        let other = PTSClock::from_instant(clock.start_instant());
        let earlier = clock.start_instant() - Duration::from_millis(1);
        assert_eq!(other.at(earlier), Duration::ZERO);
    }

    #[test]
    fn test_frame_duration() {
        assert_eq!(frame_duration(25.0), Duration::from_millis(40));
        assert_eq!(frame_duration(0.0), Duration::from_millis(33));
    }
}
