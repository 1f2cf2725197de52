//! Container writer seam
//!
//! The recording engine owns timeline decisions (anchor, ordering, bridging)
//! and hands accepted samples to a [`ContainerWriter`]. Writers only encode
//! and mux. Sample timestamps stay on the capture clock; writers rebase them
//! onto the anchor passed to [`ContainerWriter::start_session`].

use super::config::{RecordingSummary, WriterSettings};
use crate::errors::CameraError;
use crate::types::{AudioSample, VideoSample};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterStatus {
    /// Created, timeline not started
    Unknown,
    Writing,
    Failed,
}

pub trait ContainerWriter: Send {
    fn path(&self) -> &Path;
    fn status(&self) -> WriterStatus;

    /// Start the container timeline; `anchor` becomes time zero
    fn start_session(&mut self, anchor: Duration) -> Result<(), CameraError>;

    /// Whether the video input can take another sample without blocking
    fn video_ready(&mut self) -> bool;
    fn audio_ready(&mut self) -> bool;

    fn append_video(&mut self, sample: &VideoSample) -> Result<(), CameraError>;
    fn append_audio(&mut self, sample: &AudioSample) -> Result<(), CameraError>;

    /// Mark inputs finished and finalize the file
    fn finish(self: Box<Self>) -> Result<RecordingSummary, CameraError>;

    /// Abandon the file and remove it from disk
    fn cancel(self: Box<Self>);
}

pub trait WriterFactory: Send + Sync {
    /// Extension of produced files, without the dot
    fn file_extension(&self) -> &str;

    fn create(
        &self,
        path: &Path,
        settings: &WriterSettings,
    ) -> Result<Box<dyn ContainerWriter>, CameraError>;
}

/// Remove a partially written file, ignoring a file that never appeared
pub(crate) fn discard_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Discarded {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to discard {:?}: {}", path, e),
    }
}
