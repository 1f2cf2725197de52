//! H.264 encoding with openh264

use crate::errors::CameraError;
use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;

/// Annex B access unit produced for one input frame
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub is_keyframe: bool,
}

/// RGB24 to H.264 encoder with a fixed keyframe interval
pub struct H264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
    keyframe_interval: u64,
    frames_encoded: u64,
    yuv: Vec<u8>,
}

impl H264Encoder {
    /// Dimensions must be even. One keyframe is forced every two seconds of frames.
    pub fn new(width: u32, height: u32, fps: f64) -> Result<Self, CameraError> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(CameraError::encoding(format!(
                "encoder needs even, non-zero dimensions, got {}x{}",
                width, height
            )));
        }
        let encoder = Encoder::new()
            .map_err(|e| CameraError::encoding(format!("Failed to create encoder: {}", e)))?;

        let keyframe_interval = (fps.max(1.0) * 2.0).round() as u64;
        Ok(Self {
            encoder,
            width,
            height,
            keyframe_interval,
            frames_encoded: 0,
            yuv: Vec::with_capacity(width as usize * height as usize * 3 / 2),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    pub fn encode_rgb(&mut self, rgb: &[u8]) -> Result<EncodedFrame, CameraError> {
        let expected = self.width as usize * self.height as usize * 3;
        if rgb.len() != expected {
            return Err(CameraError::encoding(format!(
                "frame is {} bytes, expected {}",
                rgb.len(),
                expected
            )));
        }

        if self.frames_encoded > 0 && self.frames_encoded % self.keyframe_interval == 0 {
            self.encoder.force_intra_frame();
        }

        rgb_to_i420(rgb, self.width as usize, self.height as usize, &mut self.yuv);
        let buffer = YUVBuffer::from_vec(
            std::mem::take(&mut self.yuv),
            self.width as usize,
            self.height as usize,
        );

        let bitstream = self
            .encoder
            .encode(&buffer)
            .map_err(|e| CameraError::encoding(format!("H.264 encode failed: {}", e)))?;
        let is_keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        let data = bitstream.to_vec();
        self.frames_encoded += 1;

        Ok(EncodedFrame { data, is_keyframe })
    }
}

/// BT.601 RGB24 to I420, chroma averaged over each 2x2 block
fn rgb_to_i420(rgb: &[u8], width: usize, height: usize, out: &mut Vec<u8>) {
    let luma = width * height;
    let chroma_w = width / 2;
    let chroma = chroma_w * (height / 2);
    out.clear();
    out.resize(luma + chroma * 2, 0);

    let (y_plane, uv) = out.split_at_mut(luma);
    let (u_plane, v_plane) = uv.split_at_mut(chroma);

    for row in 0..height {
        for col in 0..width {
            let i = (row * width + col) * 3;
            let (r, g, b) = (rgb[i] as i32, rgb[i + 1] as i32, rgb[i + 2] as i32);
            y_plane[row * width + col] = (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8;
        }
    }

    for row in 0..height / 2 {
        for col in 0..chroma_w {
            let (mut r, mut g, mut b) = (0i32, 0i32, 0i32);
            for (dy, dx) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                let i = ((row * 2 + dy) * width + col * 2 + dx) * 3;
                r += rgb[i] as i32;
                g += rgb[i + 1] as i32;
                b += rgb[i + 2] as i32;
            }
            let (r, g, b) = (r / 4, g / 4, b / 4);
            let idx = row * chroma_w + col;
            u_plane[idx] = (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
            v_plane[idx] = (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i420_plane_sizes() {
        let rgb = vec![128u8; 64 * 48 * 3];
        let mut out = Vec::new();
        rgb_to_i420(&rgb, 64, 48, &mut out);
        assert_eq!(out.len(), 64 * 48 * 3 / 2);
    }

    #[test]
    fn test_i420_white_and_black() {
        let mut out = Vec::new();
        rgb_to_i420(&[255u8; 2 * 2 * 3], 2, 2, &mut out);
        assert_eq!(out[0], 235);
        assert_eq!(out[4], 128);

        rgb_to_i420(&[0u8; 2 * 2 * 3], 2, 2, &mut out);
        assert_eq!(out[0], 16);
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        assert!(H264Encoder::new(641, 480, 30.0).is_err());
    }

    #[test]
    fn test_first_frame_is_keyframe() {
        let mut encoder = H264Encoder::new(320, 240, 30.0).unwrap();
        let frame = encoder.encode_rgb(&vec![90u8; 320 * 240 * 3]).unwrap();
        assert!(frame.is_keyframe);
        assert!(
            frame.data.starts_with(&[0, 0, 0, 1]) || frame.data.starts_with(&[0, 0, 1]),
            "Annex B start code expected"
        );
        assert!(encoder.encode_rgb(&[0u8; 12]).is_err());
    }
}
