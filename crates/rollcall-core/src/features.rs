//! Pixel feature extraction.
//!
//! A face crop is resized to a small fixed resolution and its RGB bytes are
//! flattened row-major into `f32`. No normalization is applied, so values stay
//! in the 0–255 intensity range.

use crate::types::{BoundingBox, FeatureVector};
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

pub const DEFAULT_FACE_WIDTH: u32 = 50;
pub const DEFAULT_FACE_HEIGHT: u32 = 50;
pub const CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("face region at ({x}, {y}) lies outside the {frame_width}x{frame_height} frame")]
    EmptyRegion {
        x: u32,
        y: u32,
        frame_width: u32,
        frame_height: u32,
    },
}

/// Turns face crops into vectors of exactly `width * height * 3` values.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    width: u32,
    height: u32,
}

impl FeatureExtractor {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Length of every vector this extractor produces.
    pub fn dimension(&self) -> usize {
        self.width as usize * self.height as usize * CHANNELS
    }

    /// Extract a vector from an already-cropped face.
    pub fn extract(&self, face: &RgbImage) -> FeatureVector {
        let resized = imageops::resize(face, self.width, self.height, FilterType::Triangle);
        let values: Vec<f32> = resized.as_raw().iter().map(|&p| p as f32).collect();
        debug_assert_eq!(values.len(), self.dimension());
        FeatureVector::new(values)
    }

    /// Crop `face` out of `frame` and extract its vector.
    pub fn extract_region(
        &self,
        frame: &RgbImage,
        face: &BoundingBox,
    ) -> Result<FeatureVector, FeatureError> {
        let region = face
            .clamp_to(frame.width(), frame.height())
            .ok_or(FeatureError::EmptyRegion {
                x: face.x,
                y: face.y,
                frame_width: frame.width(),
                frame_height: frame.height(),
            })?;

        let crop = imageops::crop_imm(frame, region.x, region.y, region.width, region.height)
            .to_image();
        Ok(self.extract(&crop))
    }

    /// Decode an encoded face image (PNG, JPEG, ...) and extract its vector.
    pub fn extract_encoded(&self, bytes: &[u8]) -> Result<FeatureVector, FeatureError> {
        let face = image::load_from_memory(bytes)?.to_rgb8();
        Ok(self.extract(&face))
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_FACE_WIDTH, DEFAULT_FACE_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_dimension_default() {
        assert_eq!(FeatureExtractor::default().dimension(), 7500);
    }

    #[test]
    fn test_extract_length_matches_dimension() {
        let extractor = FeatureExtractor::default();
        for (w, h) in [(10, 10), (50, 50), (173, 91), (1, 300)] {
            let v = extractor.extract(&gradient(w, h));
            assert_eq!(v.len(), extractor.dimension(), "input {w}x{h}");
        }
    }

    #[test]
    fn test_extract_is_deterministic() {
        let extractor = FeatureExtractor::default();
        let face = gradient(120, 140);
        assert_eq!(extractor.extract(&face), extractor.extract(&face));
    }

    #[test]
    fn test_extract_keeps_rgb_order_and_range() {
        let extractor = FeatureExtractor::new(4, 4);
        let red = RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]));
        let v = extractor.extract(&red);
        for px in v.values.chunks(CHANNELS) {
            assert!((px[0] - 255.0).abs() < 0.5, "red channel {px:?}");
            assert!(px[1].abs() < 0.5);
            assert!(px[2].abs() < 0.5);
        }
    }

    #[test]
    fn test_extract_region_crops() {
        let extractor = FeatureExtractor::new(2, 2);
        let mut frame = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        for y in 5..15 {
            for x in 5..15 {
                frame.put_pixel(x, y, Rgb([0, 200, 0]));
            }
        }
        let face = BoundingBox { x: 5, y: 5, width: 10, height: 10, confidence: 1.0 };
        let v = extractor.extract_region(&frame, &face).unwrap();
        assert_eq!(v.len(), 12);
        assert!(v.values.chunks(3).all(|px| (px[1] - 200.0).abs() < 0.5));
    }

    #[test]
    fn test_extract_region_outside_frame() {
        let extractor = FeatureExtractor::default();
        let frame = gradient(10, 10);
        let face = BoundingBox { x: 30, y: 0, width: 5, height: 5, confidence: 1.0 };
        assert!(matches!(
            extractor.extract_region(&frame, &face),
            Err(FeatureError::EmptyRegion { .. })
        ));
    }

    #[test]
    fn test_extract_encoded_matches_raw() {
        let extractor = FeatureExtractor::default();
        let face = gradient(64, 64);
        let mut png = Vec::new();
        face.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();

        let decoded = extractor.extract_encoded(&png).unwrap();
        assert_eq!(decoded, extractor.extract(&face));
    }

    #[test]
    fn test_extract_encoded_malformed() {
        let extractor = FeatureExtractor::default();
        let result = extractor.extract_encoded(b"definitely not an image");
        assert!(matches!(result, Err(FeatureError::Decode(_))));
    }
}
