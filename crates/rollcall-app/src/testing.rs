//! Shared fixtures for the workflow tests.

use rollcall_core::detector::DetectorError;
use rollcall_core::{BoundingBox, FaceDetector, FeatureExtractor};
use rollcall_store::{Collections, MemoryService, VectorStore};
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::sync::Arc;

pub const FRAME_SIZE: u32 = 8;
pub const FACE_COLLECTION: &str = "faces";
pub const ATTENDANCE_COLLECTION: &str = "attendance";

/// 2x2 crops keep vectors at 12 values.
pub fn extractor() -> FeatureExtractor {
    FeatureExtractor::new(2, 2)
}

pub fn memory_store() -> (Arc<MemoryService>, VectorStore) {
    let svc = Arc::new(MemoryService::new());
    let store = VectorStore::connect(
        svc.clone(),
        Collections {
            face: FACE_COLLECTION.into(),
            attendance: ATTENDANCE_COLLECTION.into(),
            dimension: extractor().dimension(),
        },
    )
    .unwrap();
    (svc, store)
}

pub fn solid(rgb: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(FRAME_SIZE, FRAME_SIZE, Rgb(rgb))
}

/// Horizontal red and vertical green ramps over a flat blue channel.
pub fn gradient() -> RgbImage {
    RgbImage::from_fn(FRAME_SIZE, FRAME_SIZE, |x, y| Rgb([(10 + 30 * x) as u8, (10 + 30 * y) as u8, 60]))
}

pub fn whole_frame() -> BoundingBox {
    BoundingBox { x: 0, y: 0, width: FRAME_SIZE, height: FRAME_SIZE, confidence: 1.0 }
}

/// Hands out a fixed list of detections per call; empty once the script runs out.
pub struct ScriptedDetector {
    script: VecDeque<Vec<BoundingBox>>,
    fallback: Vec<BoundingBox>,
}

impl ScriptedDetector {
    /// Same detections for every frame.
    pub fn always(faces: Vec<BoundingBox>) -> Self {
        Self { script: VecDeque::new(), fallback: faces }
    }

    pub fn one_face() -> Self {
        Self::always(vec![whole_frame()])
    }

    pub fn no_faces() -> Self {
        Self::always(Vec::new())
    }

    pub fn script(frames: Vec<Vec<BoundingBox>>) -> Self {
        Self { script: frames.into(), fallback: Vec::new() }
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        Ok(self.script.pop_front().unwrap_or_else(|| self.fallback.clone()))
    }
}
