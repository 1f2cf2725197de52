//! Opus encoding (libopus) at a fixed 48kHz

use super::encoder::{AudioEncoder, AudioPacket, PcmFramer};
use crate::errors::CameraError;
use crate::types::{AudioCodec, AudioSample};

/// 20ms at 48kHz
pub const OPUS_FRAME_SAMPLES: usize = 960;
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// OPUS_APPLICATION_AUDIO
const OPUS_APPLICATION_AUDIO: i32 = 2049;
const MAX_PACKET_BYTES: usize = 4000;

pub struct OpusEncoder {
    encoder: *mut libopus_sys::OpusEncoder,
    channels: u16,
    framer: PcmFramer,
    frames_encoded: u64,
}

// SAFETY: the libopus state is owned exclusively by this value and only
// touched through `&mut self`; the type is deliberately not `Sync`.
unsafe impl Send for OpusEncoder {}

impl OpusEncoder {
    pub fn new(channels: u16, bitrate: u32) -> Result<Self, CameraError> {
        if channels != 1 && channels != 2 {
            return Err(CameraError::encoding(format!(
                "Opus supports mono or stereo, got {} channels",
                channels
            )));
        }

        let mut error: i32 = 0;
        let encoder = unsafe {
            libopus_sys::opus_encoder_create(
                OPUS_SAMPLE_RATE as i32,
                channels as i32,
                OPUS_APPLICATION_AUDIO,
                &mut error,
            )
        };
        if encoder.is_null() || error != 0 {
            return Err(CameraError::encoding(format!(
                "Failed to create Opus encoder: error code {}",
                error
            )));
        }

        let result = unsafe {
            libopus_sys::opus_encoder_ctl(
                encoder,
                libopus_sys::OPUS_SET_BITRATE_REQUEST as i32,
                bitrate as i32,
            )
        };
        if result != 0 {
            unsafe { libopus_sys::opus_encoder_destroy(encoder) };
            return Err(CameraError::encoding(format!(
                "Failed to set Opus bitrate: error code {}",
                result
            )));
        }

        Ok(Self {
            encoder,
            channels,
            framer: PcmFramer::new(OPUS_FRAME_SAMPLES, OPUS_SAMPLE_RATE, channels),
            frames_encoded: 0,
        })
    }

    fn drain_frames(&mut self) -> Result<Vec<AudioPacket>, CameraError> {
        let mut packets = Vec::new();
        while let Some(frame) = self.framer.next_frame() {
            let mut output = vec![0u8; MAX_PACKET_BYTES];
            let len = unsafe {
                libopus_sys::opus_encode_float(
                    self.encoder,
                    frame.as_ptr(),
                    OPUS_FRAME_SAMPLES as i32,
                    output.as_mut_ptr(),
                    output.len() as i32,
                )
            };
            if len < 0 {
                return Err(CameraError::encoding(format!(
                    "Opus encoding failed: error code {}",
                    len
                )));
            }
            output.truncate(len as usize);
            packets.push(AudioPacket {
                data: output,
                pts: self.framer.pts(self.frames_encoded),
            });
            self.frames_encoded += 1;
        }
        Ok(packets)
    }
}

impl AudioEncoder for OpusEncoder {
    fn codec(&self) -> AudioCodec {
        AudioCodec::Opus
    }

    fn sample_rate(&self) -> u32 {
        OPUS_SAMPLE_RATE
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn encode(&mut self, sample: &AudioSample) -> Result<Vec<AudioPacket>, CameraError> {
        self.framer.push(sample)?;
        self.drain_frames()
    }

    fn flush(&mut self) -> Result<Vec<AudioPacket>, CameraError> {
        self.framer.pad();
        self.drain_frames()
    }
}

impl Drop for OpusEncoder {
    fn drop(&mut self) {
        if !self.encoder.is_null() {
            unsafe { libopus_sys::opus_encoder_destroy(self.encoder) };
        }
    }
}
