//! Microphone capture (cpal) and track encoding (AAC-LC via fdk-aac, Opus via libopus)

mod aac;
mod capture;
mod device;
mod encoder;
mod opus;

pub use aac::{AacEncoder, AAC_FRAME_SAMPLES};
pub use capture::MicrophoneCapture;
pub use device::{default_audio_device, has_input_device, list_audio_devices, AudioDevice};
pub use encoder::{conform, create_encoder, AudioEncoder, AudioPacket};
pub use opus::{OpusEncoder, OPUS_FRAME_SAMPLES, OPUS_SAMPLE_RATE};
