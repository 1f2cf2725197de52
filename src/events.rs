//! Out-of-band notifications from the engine to its caller
//!
//! Events fire without a pending request (a deadline-triggered finalize, for
//! instance), so they travel on their own channel. The stream can be taken
//! exactly once; until then events buffer in the channel.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EngineEvent {
    /// A recording was finalized successfully
    #[serde(rename = "onVideoRecorded")]
    VideoRecorded { path: PathBuf },
    /// Finalization failed; the partial file has been discarded
    #[serde(rename = "onVideoError")]
    VideoError { message: String },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::VideoRecorded { .. } => "onVideoRecorded",
            EngineEvent::VideoError { .. } => "onVideoError",
        }
    }
}

/// Sending half, cloned into every component that reports events
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Sender<EngineEvent>,
}

impl EventSink {
    pub fn emit(&self, event: EngineEvent) {
        log::info!("Emitting {}", event.name());
        // The receiver may have been dropped by the caller; events are fire-and-forget.
        let _ = self.sender.send(event);
    }
}

/// Receiving half handed to the caller
#[derive(Debug)]
pub struct EventStream {
    receiver: Receiver<EngineEvent>,
}

impl EventStream {
    pub fn try_next(&self) -> Option<EngineEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Every event currently buffered
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.receiver.try_iter().collect()
    }
}

impl Iterator for EventStream {
    type Item = EngineEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

/// Holds the stream until the caller subscribes
#[derive(Debug)]
pub(crate) struct EventHub {
    sink: EventSink,
    stream: Mutex<Option<EventStream>>,
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sink: EventSink { sender },
            stream: Mutex::new(Some(EventStream { receiver })),
        }
    }

    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    pub fn take_stream(&self) -> Option<EventStream> {
        match self.stream.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_is_taken_once() {
        let hub = EventHub::new();
        assert!(hub.take_stream().is_some());
        assert!(hub.take_stream().is_none());
    }

    #[test]
    fn test_events_buffer_before_subscription() {
        let hub = EventHub::new();
        hub.sink().emit(EngineEvent::VideoError {
            message: "disk full".to_string(),
        });
        let stream = hub.take_stream().unwrap();
        assert_eq!(
            stream.try_next(),
            Some(EngineEvent::VideoError {
                message: "disk full".to_string()
            })
        );
        assert_eq!(stream.try_next(), None);
    }

    #[test]
    fn test_event_json_shape() {
        let event = EngineEvent::VideoRecorded {
            path: PathBuf::from("/tmp/a.mp4"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "onVideoRecorded");
        assert_eq!(json["path"], "/tmp/a.mp4");
    }
}
