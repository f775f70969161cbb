use serde::{Deserialize, Serialize};

/// Label reported for a face that did not clear the similarity threshold.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Bounding box of a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Intersect the box with a `frame_width` × `frame_height` frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        if self.x >= frame_width || self.y >= frame_height {
            return None;
        }
        let width = self.width.min(frame_width - self.x);
        let height = self.height.min(frame_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(BoundingBox {
            width,
            height,
            ..*self
        })
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Flattened face pixels used as the similarity-search vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Constant all-ones vector for records whose vector carries no meaning.
    pub fn placeholder(dimension: usize) -> Self {
        Self {
            values: vec![1.0; dimension],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Cosine similarity in [-1, 1]. Zero-norm inputs score 0.
    pub fn similarity(&self, other: &[f32]) -> f32 {
        cosine_similarity(&self.values, other)
    }

    pub fn euclidean_distance(&self, other: &[f32]) -> f32 {
        euclidean_distance(&self.values, other)
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Outcome of labelling one face: a known student or `Unknown` with score 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub name: String,
    pub roll_no: String,
    pub score: f32,
}

impl Recognition {
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_LABEL.to_string(),
            roll_no: String::new(),
            score: 0.0,
        }
    }

    /// Gate the best nearest-neighbour hit against `threshold`.
    ///
    /// A score equal to the threshold is accepted. Anything below it, a hit
    /// without a usable name, or no hit at all yields [`Recognition::unknown`].
    pub fn from_best_match(best: Option<(&str, &str, f32)>, threshold: f32) -> Self {
        match best {
            Some((name, roll_no, score))
                if score >= threshold && !name.trim().is_empty() && name != UNKNOWN_LABEL =>
            {
                Self {
                    name: name.to_string(),
                    roll_no: roll_no.to_string(),
                    score,
                }
            }
            _ => Self::unknown(),
        }
    }

    pub fn is_known(&self) -> bool {
        self.name != UNKNOWN_LABEL
    }
}

impl Default for Recognition {
    fn default() -> Self {
        Self::unknown()
    }
}
