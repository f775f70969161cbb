//! Cascade face detector.
//!
//! Wraps the SeetaFace funnel-structured cascade from `rustface`. Frames are
//! converted to grayscale before detection; boxes come back in frame pixel
//! coordinates sorted by confidence.

use crate::types::BoundingBox;
use image::{imageops, RgbImage};
use std::path::Path;
use thiserror::Error;

// --- Named constants (cascade defaults for frontal faces at webcam scale) ---
const CASCADE_MIN_FACE_SIZE: u32 = 40;
const CASCADE_SCORE_THRESHOLD: f64 = 2.0;
const CASCADE_PYRAMID_SCALE: f32 = 0.8;
const CASCADE_WINDOW_STEP: u32 = 4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download seeta_fd_frontal_v1.0.bin and set DETECTOR_MODEL")]
    ModelNotFound(String),
    #[error("failed to load cascade model {path}: {message}")]
    ModelLoad { path: String, message: String },
}

/// Anything that can locate faces in an RGB frame.
pub trait FaceDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Tuning knobs for the cascade scan.
#[derive(Debug, Clone, Copy)]
pub struct CascadeParams {
    pub min_face_size: u32,
    pub score_threshold: f64,
    pub pyramid_scale: f32,
    pub window_step: u32,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            min_face_size: CASCADE_MIN_FACE_SIZE,
            score_threshold: CASCADE_SCORE_THRESHOLD,
            pyramid_scale: CASCADE_PYRAMID_SCALE,
            window_step: CASCADE_WINDOW_STEP,
        }
    }
}

/// Pre-trained funnel cascade detector.
pub struct CascadeDetector {
    inner: Box<dyn rustface::Detector>,
}

impl CascadeDetector {
    /// Load the cascade model from `model_path` with default parameters.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        Self::load_with(model_path, CascadeParams::default())
    }

    pub fn load_with(model_path: &str, params: CascadeParams) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let mut inner =
            rustface::create_detector(model_path).map_err(|e| DetectorError::ModelLoad {
                path: model_path.to_string(),
                message: e.to_string(),
            })?;

        inner.set_min_face_size(params.min_face_size);
        inner.set_score_thresh(params.score_threshold);
        inner.set_pyramid_scale_factor(params.pyramid_scale);
        inner.set_slide_window_step(params.window_step, params.window_step);

        tracing::info!(path = model_path, ?params, "loaded cascade face model");

        Ok(Self { inner })
    }
}

impl FaceDetector for CascadeDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (width, height) = frame.dimensions();
        let gray = imageops::grayscale(frame);
        let mut image = rustface::ImageData::new(gray.as_raw(), width, height);

        let mut faces: Vec<BoundingBox> = self
            .inner
            .detect(&mut image)
            .into_iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                to_bounding_box(
                    bbox.x(),
                    bbox.y(),
                    bbox.width(),
                    bbox.height(),
                    face.score() as f32,
                    width,
                    height,
                )
            })
            .collect();

        sort_by_confidence(&mut faces);
        tracing::trace!(count = faces.len(), width, height, "cascade detection");
        Ok(faces)
    }
}

/// Convert a raw cascade rectangle (which may start off-frame) into a
/// clamped [`BoundingBox`].
fn to_bounding_box(
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    confidence: f32,
    frame_width: u32,
    frame_height: u32,
) -> Option<BoundingBox> {
    // Shift the origin onto the frame, shrinking the box by the overhang.
    let overhang_x = x.min(0).unsigned_abs();
    let overhang_y = y.min(0).unsigned_abs();
    let raw = BoundingBox {
        x: x.max(0) as u32,
        y: y.max(0) as u32,
        width: width.saturating_sub(overhang_x),
        height: height.saturating_sub(overhang_y),
        confidence,
    };
    raw.clamp_to(frame_width, frame_height)
}

fn sort_by_confidence(faces: &mut [BoundingBox]) {
    faces.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
