//! Video recording
//!
//! [`RecordingEngine`] decides what reaches the file: it anchors the timeline
//! on the first sample, drops stale or unready samples, bridges single-camera
//! switches and finalizes on the writer context. [`ContainerWriter`]s do the
//! encoding:
//! - [`TimelineWriter`]: JSON manifest of the accepted timeline, no codecs
//! - `Mp4Writer` (feature `recording`): openh264 + muxide, AAC-LC or Opus audio with `audio`
//!
//! ```rust,ignore
//! let engine = RecordingEngine::new(factory, config, dir, events)?;
//! engine.start(WriterSettings::new(1280, 720, 30.0), None)?;
//! // the capture backend feeds the engine as a SampleSink
//! let path = engine.stop(false)?;
//! ```

mod bridge;
mod config;
mod engine;
mod timeline;
mod writer;

#[cfg(feature = "recording")]
mod encoder;
#[cfg(feature = "recording")]
mod mp4;

pub use bridge::{filler_count, filler_timestamps, FillerFrame};
pub use config::{AudioTrackSettings, RecordingSummary, WriterSettings};
pub use engine::{RecorderPhase, RecordingEngine};
pub use timeline::{AudioEntry, Timeline, TimelineWriter, TimelineWriterFactory, VideoEntry};
pub use writer::{ContainerWriter, WriterFactory, WriterStatus};

#[cfg(feature = "recording")]
pub use encoder::{EncodedFrame, H264Encoder};
#[cfg(feature = "recording")]
pub use mp4::{Mp4Writer, Mp4WriterFactory};

use std::sync::Arc;

/// Writer factory used when the caller does not supply one
pub fn default_writer_factory() -> Arc<dyn WriterFactory> {
    #[cfg(feature = "recording")]
    {
        Arc::new(Mp4WriterFactory::new())
    }
    #[cfg(not(feature = "recording"))]
    {
        Arc::new(TimelineWriterFactory::new())
    }
}
