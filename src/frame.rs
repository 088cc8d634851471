//! Captured frames and annotated replies.
//!
//! - `Frame`: RGB raster grabbed from a media stream. Dimensions travel with the
//!   pixels so the encoder always uses the stream's native size.
//! - `AnnotatedFrame`: JPEG returned by the detection service, decoded once so
//!   the render sink can draw it.
//!
//! Rasters are dropped at the end of the cycle that produced them. Only the
//! encoded JPEG of an annotated frame may outlive its cycle (moved into the
//! gallery).

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};

/// Default JPEG quality for submitted frames (0.9 on a 0..1 scale).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

// ----------------------------------------------------------------------------
// Frame: captured RGB raster
// ----------------------------------------------------------------------------

/// RGB8 raster grabbed from a capture stream.
#[derive(Debug)]
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Wrap a packed RGB8 buffer. The buffer length must match the dimensions.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} rgb",
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Encode the raster as JPEG with a fixed quality (1..=100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        if !(1..=100).contains(&quality) {
            return Err(anyhow!("jpeg quality must be within 1..=100, got {}", quality));
        }
        let mut out = Vec::with_capacity(self.pixels.len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality)
            .write_image(&self.pixels, self.width, self.height, ExtendedColorType::Rgb8)
            .context("encode frame as jpeg")?;
        Ok(out)
    }
}

// ----------------------------------------------------------------------------
// AnnotatedFrame: decoded service reply
// ----------------------------------------------------------------------------

/// Annotated image returned by the detection service.
pub struct AnnotatedFrame {
    jpeg: Vec<u8>,
    image: RgbImage,
}

impl AnnotatedFrame {
    /// Decode the returned bytes. Fails if the payload is not a decodable image.
    pub fn decode(jpeg: Vec<u8>) -> Result<Self> {
        if jpeg.is_empty() {
            return Err(anyhow!("annotated frame is empty"));
        }
        let image = image::load_from_memory(&jpeg)
            .context("decode annotated frame")?
            .into_rgb8();
        Ok(Self { jpeg, image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encoded bytes as received from the service.
    pub fn jpeg(&self) -> &[u8] {
        &self.jpeg
    }

    /// Keep only the encoded bytes, dropping the decoded raster.
    pub fn into_jpeg(self) -> Vec<u8> {
        self.jpeg
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 128]);
            }
        }
        Frame::from_rgb(pixels, width, height).unwrap()
    }

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::from_rgb(vec![0u8; 10], 4, 4).is_err());
        assert!(Frame::from_rgb(Vec::new(), 0, 4).is_err());
    }

    #[test]
    fn encoded_frame_decodes_with_same_dimensions() {
        let frame = gradient(64, 48);
        let jpeg = frame.encode_jpeg(DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let annotated = AnnotatedFrame::decode(jpeg).unwrap();
        assert_eq!(annotated.width(), 64);
        assert_eq!(annotated.height(), 48);
    }

    #[test]
    fn lower_quality_produces_smaller_output() {
        let frame = gradient(128, 96);
        let high = frame.encode_jpeg(95).unwrap();
        let low = frame.encode_jpeg(10).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn rejects_out_of_range_quality() {
        let frame = gradient(8, 8);
        assert!(frame.encode_jpeg(0).is_err());
        assert!(frame.encode_jpeg(101).is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(AnnotatedFrame::decode(Vec::new()).is_err());
        assert!(AnnotatedFrame::decode(b"not an image".to_vec()).is_err());
    }
}
