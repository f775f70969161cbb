//! Frame sources for the sampling loops.

use image::RgbImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("cannot read frame directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A producer of successive RGB frames. `Ok(None)` means the source is drained.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameError>;
}

/// Replays the still images of a directory in file-name order.
///
/// Unreadable files are skipped with a warning, the same way a dropped
/// camera read is skipped.
pub struct ImageDirSource {
    pending: VecDeque<PathBuf>,
}

impl ImageDirSource {
    pub fn open(dir: &Path) -> Result<Self, FrameError> {
        let to_err = |source| FrameError::Directory {
            path: dir.display().to_string(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(to_err)? {
            let path = entry.map_err(to_err)?.path();
            if path.is_file() && has_image_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        tracing::debug!(dir = %dir.display(), frames = paths.len(), "opened frame directory");
        Ok(Self {
            pending: paths.into(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameError> {
        while let Some(path) = self.pending.pop_front() {
            match image::open(&path) {
                Ok(img) => return Ok(Some(img.to_rgb8())),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable frame");
                }
            }
        }
        Ok(None)
    }
}

/// In-memory frames, handed out in order.
#[derive(Default)]
pub struct MemorySource {
    frames: VecDeque<RgbImage>,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    /// `count` copies of the same frame.
    pub fn repeat(frame: RgbImage, count: usize) -> Self {
        Self::new(vec![frame; count])
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameError> {
        Ok(self.frames.pop_front())
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
