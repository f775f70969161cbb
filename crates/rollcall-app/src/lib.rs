//! rollcall-app — Attendance workflows and the request handler.
//!
//! Each workflow takes its collaborators explicitly: the [`VectorStore`],
//! a [`FaceDetector`] and a [`FeatureExtractor`]. [`Handler`] strings them
//! together behind one request/response call per user interaction.
//!
//! [`VectorStore`]: rollcall_store::VectorStore
//! [`FaceDetector`]: rollcall_core::FaceDetector
//! [`FeatureExtractor`]: rollcall_core::FeatureExtractor

pub mod attendance;
pub mod config;
pub mod enroll;
pub mod error;
pub mod handler;
pub mod recognize;
pub mod report;
pub mod session;
pub mod students;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{AppError, ValidationError};
pub use handler::{Handler, Request, Response, StoreState};
pub use session::{Session, StopFlag};
