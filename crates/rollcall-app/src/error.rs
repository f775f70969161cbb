use crate::config::ConfigError;
use rollcall_core::detector::DetectorError;
use rollcall_core::features::FeatureError;
use rollcall_core::frames::FrameError;
use rollcall_store::StoreError;
use thiserror::Error;

/// Input problems caught before any network call. Nothing is mutated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("no face detected")]
    NoFace,
    #[error("{0} faces detected; exactly one is required")]
    MultipleFaces(usize),
    #[error("student {0} is already enrolled")]
    AlreadyEnrolled(String),
    #[error("no student has been recognized yet")]
    NothingRecognized,
    #[error("camera is already running")]
    CameraBusy,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("vector store call failed: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("enrollment stopped early: only {collected} of {required} samples collected, nothing uploaded")]
    EnrollmentIncomplete { collected: usize, required: usize },
    #[error("feature extraction failed: {0}")]
    Feature(#[from] FeatureError),
    #[error("face detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("frame source error: {0}")]
    Frames(#[from] FrameError),
    #[error("face detector not loaded: {0}")]
    DetectorUnavailable(String),
    #[error("report export failed: {0}")]
    Export(#[from] csv::Error),
}
