//! Microphone capture into the session sample stream

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};

use crate::errors::CameraError;
use crate::platform::SampleSink;
use crate::timing::PTSClock;
use crate::types::AudioSample;

/// Default input stream delivering timestamped chunks to a [`SampleSink`].
///
/// Chunks carry whatever rate and channel count the device runs at; the
/// container writer conforms them to its track.
pub struct MicrophoneCapture {
    stream: Stream,
    running: Arc<AtomicBool>,
    sample_rate: u32,
    channels: u16,
}

impl MicrophoneCapture {
    pub fn open(clock: PTSClock, sink: Arc<dyn SampleSink>) -> Result<Self, CameraError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| CameraError::capture("No default microphone"))?;
        let supported = device
            .default_input_config()
            .map_err(|e| CameraError::capture(format!("Microphone has no input config: {}", e)))?;

        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        let running = Arc::new(AtomicBool::new(false));
        let gate = running.clone();
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !gate.load(Ordering::Relaxed) {
                        return;
                    }
                    sink.on_audio(AudioSample {
                        pts: clock.now(),
                        sample_rate,
                        channels,
                        samples: data.to_vec(),
                    });
                },
                |err| log::error!("Microphone stream error: {}", err),
                None,
            )
            .map_err(|e| CameraError::capture(format!("Failed to open microphone: {}", e)))?;

        log::info!("Microphone opened at {}Hz x{}", sample_rate, channels);
        Ok(Self {
            stream,
            running,
            sample_rate,
            channels,
        })
    }

    pub fn start(&mut self) -> Result<(), CameraError> {
        if self.running.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.stream
            .play()
            .map_err(|e| CameraError::capture(format!("Failed to start microphone: {}", e)))?;
        self.running.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), CameraError> {
        if !self.running.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.running.store(false, Ordering::Relaxed);
        self.stream
            .pause()
            .map_err(|e| CameraError::capture(format!("Failed to stop microphone: {}", e)))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn format(&self) -> (u32, u16) {
        (self.sample_rate, self.channels)
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VideoSample;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<AudioSample>>);

    impl SampleSink for Collect {
        fn on_video(&self, _sample: VideoSample) {}
        fn on_audio(&self, sample: AudioSample) {
            self.0.lock().unwrap().push(sample);
        }
    }

    #[test]
    fn test_start_stop_idempotent() {
        // Only meaningful on hosts with a microphone
        let sink: Arc<dyn SampleSink> = Arc::new(Collect::default());
        if let Ok(mut capture) = MicrophoneCapture::open(PTSClock::new(), sink) {
            assert!(capture.start().is_ok());
            assert!(capture.start().is_ok());
            assert!(capture.is_running());
            assert!(capture.stop().is_ok());
            assert!(capture.stop().is_ok());
        }
    }
}
