//! Face recognition against the enrolled students.

use crate::error::AppError;
use crate::session::Session;
use image::RgbImage;
use rollcall_core::{BoundingBox, FaceDetector, FeatureExtractor, FeatureVector, FrameSource, Recognition};
use rollcall_store::records::{ROLL_NO, STUDENT_NAME};
use rollcall_store::{CollectionKind, VectorStore};

/// One detected face and who it was labelled as.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLabel {
    pub region: BoundingBox,
    pub recognition: Recognition,
}

/// Totals from one live recognition run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveSummary {
    pub frames: usize,
    pub faces: usize,
    /// Label of the last face seen, `Unknown` if none.
    pub last: Recognition,
    pub cancelled: bool,
}

/// Label a single vector with its nearest enrolled face.
pub fn recognize_vector(
    store: &VectorStore,
    vector: &FeatureVector,
    threshold: f32,
) -> Result<Recognition, AppError> {
    let hits = store.query_nearest(CollectionKind::Face, vector.as_slice(), 1, None)?;
    // A hit without a stored name cannot be attributed to anyone.
    let best = hits.first().and_then(|m| {
        let name = m.metadata_str(STUDENT_NAME)?;
        Some((name, m.metadata_str(ROLL_NO).unwrap_or_default(), m.score))
    });
    let recognition = Recognition::from_best_match(best, threshold);
    tracing::debug!(
        name = %recognition.name,
        score = recognition.score,
        best_score = hits.first().map(|m| m.score),
        threshold,
        "face labelled"
    );
    Ok(recognition)
}

/// Detect every face in `image` and label each one.
pub fn recognize_image(
    store: &VectorStore,
    detector: &mut dyn FaceDetector,
    extractor: &FeatureExtractor,
    image: &RgbImage,
    threshold: f32,
) -> Result<Vec<FaceLabel>, AppError> {
    let faces = detector.detect(image)?;
    let mut labels = Vec::with_capacity(faces.len());
    for region in faces {
        let vector = extractor.extract_region(image, &region)?;
        let recognition = recognize_vector(store, &vector, threshold)?;
        labels.push(FaceLabel { region, recognition });
    }
    Ok(labels)
}

/// Label faces frame by frame until the source runs dry or the session's
/// stop flag is raised.
///
/// Every labelled face overwrites `session.recognized`, so after the run it
/// holds the most recent identity.
pub fn recognize_live(
    store: &VectorStore,
    detector: &mut dyn FaceDetector,
    extractor: &FeatureExtractor,
    source: &mut dyn FrameSource,
    session: &mut Session,
    threshold: f32,
) -> Result<LiveSummary, AppError> {
    let mut summary = LiveSummary::default();

    loop {
        if session.stop.is_raised() {
            summary.cancelled = true;
            break;
        }
        let Some(frame) = source.next_frame()? else {
            break;
        };
        summary.frames += 1;

        for label in recognize_image(store, detector, extractor, &frame, threshold)? {
            summary.faces += 1;
            session.recognized = label.recognition.clone();
            summary.last = label.recognition;
        }
    }

    tracing::info!(
        frames = summary.frames,
        faces = summary.faces,
        recognized = %session.recognized.name,
        cancelled = summary.cancelled,
        "live recognition finished"
    );
    Ok(summary)
}
