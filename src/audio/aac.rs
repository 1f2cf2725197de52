//! AAC-LC encoding (fdk-aac) with ADTS framing

use super::encoder::{AudioEncoder, AudioPacket, PcmFramer};
use crate::errors::CameraError;
use crate::types::{AudioCodec, AudioSample, AAC_SAMPLE_RATES};
use fdk_aac::enc::{BitRate, ChannelMode, Encoder, EncoderParams, Transport};

/// Samples per channel in one AAC-LC access unit
pub const AAC_FRAME_SAMPLES: usize = 1024;

const MAX_FRAME_BYTES: usize = 8192;
/// Silent frames fed at flush to push out the encoder's lookahead
const MAX_DRAIN_FRAMES: usize = 8;

pub struct AacEncoder {
    encoder: Encoder,
    sample_rate: u32,
    channels: u16,
    framer: PcmFramer,
    frames_submitted: u64,
    packets_emitted: u64,
}

// SAFETY: the fdk-aac handle is owned exclusively by this value and only
// touched through `&mut self`; the type is deliberately not `Sync`.
unsafe impl Send for AacEncoder {}

impl AacEncoder {
    pub fn new(sample_rate: u32, channels: u16, bitrate: u32) -> Result<Self, CameraError> {
        let mode = match channels {
            1 => ChannelMode::Mono,
            2 => ChannelMode::Stereo,
            other => {
                return Err(CameraError::encoding(format!(
                    "AAC track supports mono or stereo, got {} channels",
                    other
                )))
            }
        };
        if !AAC_SAMPLE_RATES.contains(&sample_rate) {
            return Err(CameraError::encoding(format!(
                "AAC does not support {}Hz",
                sample_rate
            )));
        }

        let encoder = Encoder::new(EncoderParams {
            bit_rate: BitRate::Cbr(bitrate),
            sample_rate,
            transport: Transport::Adts,
            channels: mode,
        })
        .map_err(|e| CameraError::encoding(format!("Failed to create AAC encoder: {:?}", e)))?;

        Ok(Self {
            encoder,
            sample_rate,
            channels,
            framer: PcmFramer::new(AAC_FRAME_SAMPLES, sample_rate, channels),
            frames_submitted: 0,
            packets_emitted: 0,
        })
    }

    fn encode_frame(&mut self, frame: &[f32]) -> Result<Vec<AudioPacket>, CameraError> {
        let pcm: Vec<i16> = frame
            .iter()
            .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect();

        let mut packets = Vec::new();
        let mut offset = 0;
        while offset < pcm.len() {
            let mut output = vec![0u8; MAX_FRAME_BYTES];
            let info = self
                .encoder
                .encode(&pcm[offset..], &mut output)
                .map_err(|e| CameraError::encoding(format!("AAC encoding failed: {:?}", e)))?;
            if info.output_size > 0 {
                output.truncate(info.output_size);
                packets.push(AudioPacket {
                    data: output,
                    pts: self.framer.pts(self.packets_emitted),
                });
                self.packets_emitted += 1;
            }
            if info.input_consumed == 0 {
                break;
            }
            offset += info.input_consumed;
        }
        Ok(packets)
    }

    fn drain_frames(&mut self) -> Result<Vec<AudioPacket>, CameraError> {
        let mut packets = Vec::new();
        while let Some(frame) = self.framer.next_frame() {
            self.frames_submitted += 1;
            packets.extend(self.encode_frame(&frame)?);
        }
        Ok(packets)
    }
}

impl AudioEncoder for AacEncoder {
    fn codec(&self) -> AudioCodec {
        AudioCodec::Aac
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
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
        let mut packets = self.drain_frames()?;

        let silence = vec![0.0f32; self.framer.frame_len()];
        let mut fed = 0;
        while self.packets_emitted < self.frames_submitted && fed < MAX_DRAIN_FRAMES {
            packets.extend(self.encode_frame(&silence)?);
            fed += 1;
        }
        // Lookahead flushed by padding may run past the real audio
        let excess = self.packets_emitted.saturating_sub(self.frames_submitted) as usize;
        packets.truncate(packets.len().saturating_sub(excess));
        self.packets_emitted -= excess as u64;
        Ok(packets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tone(pts_ms: u64, frames: usize) -> AudioSample {
        AudioSample {
            pts: Duration::from_millis(pts_ms),
            sample_rate: 48_000,
            channels: 1,
            samples: (0..frames).map(|i| (i as f32 * 0.05).sin() * 0.5).collect(),
        }
    }

    #[test]
    fn test_rejects_surround_and_odd_rates() {
        assert!(AacEncoder::new(48_000, 6, 64_000).is_err());
        assert!(AacEncoder::new(47_000, 1, 64_000).is_err());
    }

    #[test]
    fn test_packets_are_adts_frames() {
        let mut encoder = AacEncoder::new(48_000, 1, 64_000).unwrap();
        let mut packets = encoder.encode(&tone(0, 4800)).unwrap();
        packets.extend(encoder.flush().unwrap());

        // 4800 samples pad out to five access units
        assert_eq!(packets.len(), 5);
        for packet in &packets {
            assert_eq!(packet.data[0], 0xFF);
            assert_eq!(packet.data[1] & 0xF0, 0xF0);
        }
    }

    #[test]
    fn test_packet_pts_follow_first_chunk() {
        let mut encoder = AacEncoder::new(48_000, 1, 64_000).unwrap();
        let mut packets = encoder.encode(&tone(400, 2048)).unwrap();
        packets.extend(encoder.encode(&tone(450, 2048)).unwrap());
        packets.extend(encoder.flush().unwrap());

        assert_eq!(packets.len(), 4);
        assert_eq!(packets[0].pts, Duration::from_millis(400));
        let step = packets[1].pts - packets[0].pts;
        assert_eq!(step, Duration::from_micros(21_333));
        assert!(packets.windows(2).all(|w| w[1].pts > w[0].pts));
    }
}
