//! Student enrollment.
//!
//! Both flows end with exactly [`ENROLL_SAMPLE_COUNT`] vectors uploaded under
//! one name and roll number, or nothing uploaded at all.

use crate::error::{AppError, ValidationError};
use crate::session::StopFlag;
use image::RgbImage;
use rollcall_core::{FaceDetector, FeatureExtractor, FeatureVector, FrameSource};
use rollcall_store::records::STUDENT_NAME;
use rollcall_store::{CollectionKind, FaceEntry, Filter, VectorStore};

/// Vectors stored per enrolled student.
pub const ENROLL_SAMPLE_COUNT: usize = 100;
/// Live sampling keeps faces from every Nth frame.
pub const DEFAULT_SAMPLE_INTERVAL: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollOutcome {
    pub student_name: String,
    pub roll_no: String,
    pub uploaded: usize,
}

/// Trim both inputs and reject blanks.
pub fn validate_student(name: &str, roll_no: &str) -> Result<(String, String), ValidationError> {
    let name = name.trim();
    let roll_no = roll_no.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingField("name"));
    }
    if roll_no.is_empty() {
        return Err(ValidationError::MissingField("roll number"));
    }
    Ok((name.to_string(), roll_no.to_string()))
}

/// Fail if any face record already carries `name`.
pub fn check_not_enrolled(store: &VectorStore, name: &str) -> Result<(), AppError> {
    let existing = store.query_nearest(
        CollectionKind::Face,
        &store.placeholder_vector(),
        1,
        Some(&Filter::eq(STUDENT_NAME, name)),
    )?;
    if !existing.is_empty() {
        return Err(ValidationError::AlreadyEnrolled(name.to_string()).into());
    }
    Ok(())
}

/// Pull frames until [`ENROLL_SAMPLE_COUNT`] faces are sampled, the source
/// runs dry, or `stop` is raised.
///
/// Every face detected in a frame whose index is a multiple of `interval`
/// is sampled. Returns whatever was collected; the caller decides whether
/// it is enough.
pub fn collect_live_samples(
    detector: &mut dyn FaceDetector,
    extractor: &FeatureExtractor,
    source: &mut dyn FrameSource,
    stop: &StopFlag,
    interval: usize,
) -> Result<Vec<FeatureVector>, AppError> {
    let interval = interval.max(1);
    let mut samples = Vec::with_capacity(ENROLL_SAMPLE_COUNT);
    let mut frame_index = 0usize;

    while samples.len() < ENROLL_SAMPLE_COUNT {
        if stop.is_raised() {
            tracing::info!(collected = samples.len(), "sampling cancelled");
            break;
        }
        let Some(frame) = source.next_frame()? else {
            tracing::info!(collected = samples.len(), frames = frame_index, "frame source exhausted");
            break;
        };

        if frame_index % interval == 0 {
            for face in detector.detect(&frame)? {
                if samples.len() == ENROLL_SAMPLE_COUNT {
                    break;
                }
                match extractor.extract_region(&frame, &face) {
                    Ok(vector) => samples.push(vector),
                    Err(e) => tracing::debug!(error = %e, "skipping face region"),
                }
            }
            tracing::debug!(frame = frame_index, collected = samples.len(), "sampled frame");
        }
        frame_index += 1;
    }

    Ok(samples)
}

/// Live-sample enrollment. Uploads only when exactly [`ENROLL_SAMPLE_COUNT`]
/// samples were collected.
#[allow(clippy::too_many_arguments)]
pub fn enroll_live(
    store: &VectorStore,
    detector: &mut dyn FaceDetector,
    extractor: &FeatureExtractor,
    source: &mut dyn FrameSource,
    stop: &StopFlag,
    interval: usize,
    name: &str,
    roll_no: &str,
) -> Result<EnrollOutcome, AppError> {
    let (name, roll_no) = validate_student(name, roll_no)?;
    check_not_enrolled(store, &name)?;

    tracing::info!(student = %name, roll_no = %roll_no, interval, "collecting face samples");
    let samples = collect_live_samples(detector, extractor, source, stop, interval)?;
    if samples.len() < ENROLL_SAMPLE_COUNT {
        tracing::warn!(student = %name, collected = samples.len(), "enrollment incomplete; nothing uploaded");
        return Err(AppError::EnrollmentIncomplete {
            collected: samples.len(),
            required: ENROLL_SAMPLE_COUNT,
        });
    }

    upload(store, name, roll_no, samples)
}

/// Single-capture enrollment: one image with exactly one face, its vector
/// stored [`ENROLL_SAMPLE_COUNT`] times.
pub fn enroll_single_capture(
    store: &VectorStore,
    detector: &mut dyn FaceDetector,
    extractor: &FeatureExtractor,
    image: &RgbImage,
    name: &str,
    roll_no: &str,
) -> Result<EnrollOutcome, AppError> {
    let (name, roll_no) = validate_student(name, roll_no)?;

    let faces = detector.detect(image)?;
    let face = match faces.as_slice() {
        [] => return Err(ValidationError::NoFace.into()),
        [face] => face,
        many => return Err(ValidationError::MultipleFaces(many.len()).into()),
    };
    let vector = extractor.extract_region(image, face)?;

    check_not_enrolled(store, &name)?;
    upload(store, name, roll_no, vec![vector; ENROLL_SAMPLE_COUNT])
}

fn upload(
    store: &VectorStore,
    name: String,
    roll_no: String,
    samples: Vec<FeatureVector>,
) -> Result<EnrollOutcome, AppError> {
    let entries: Vec<FaceEntry> = samples
        .into_iter()
        .map(|v| FaceEntry::new(&name, &roll_no, v))
        .collect();
    let uploaded = store.upsert_face_batch(entries)?;
    tracing::info!(student = %name, roll_no = %roll_no, uploaded, "student enrolled");
    Ok(EnrollOutcome {
        student_name: name,
        roll_no,
        uploaded,
    })
}
