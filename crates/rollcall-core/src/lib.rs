//! rollcall-core — Face detection and feature extraction.
//!
//! Finds faces with a funnel-structured cascade classifier and turns each
//! cropped face into a fixed-length vector of raw RGB intensities.

pub mod detector;
pub mod features;
pub mod frames;
pub mod types;

pub use detector::{CascadeDetector, FaceDetector};
pub use features::FeatureExtractor;
pub use frames::FrameSource;
pub use types::{BoundingBox, FeatureVector, Recognition};
