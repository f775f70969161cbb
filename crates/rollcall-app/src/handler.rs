//! One request in, one response out.
//!
//! [`Handler`] owns the long-lived collaborators (store connection, face
//! detector, feature extractor) and dispatches each [`Request`] to a
//! workflow. Per-operator state lives in the [`Session`] passed alongside.

use crate::attendance::{get_all_attendance_records, mark_attendance, MarkOutcome};
use crate::config::Config;
use crate::enroll::{enroll_live, enroll_single_capture, EnrollOutcome, DEFAULT_SAMPLE_INTERVAL};
use crate::error::{AppError, ValidationError};
use crate::recognize::{recognize_image, recognize_live, FaceLabel, LiveSummary};
use crate::report::AttendanceReport;
use crate::session::Session;
use crate::students::{delete_student_data, update_student_roll_no, RollUpdate};
use image::RgbImage;
use rollcall_core::{CascadeDetector, FaceDetector, FeatureExtractor, FrameSource, Recognition};
use rollcall_store::{Collections, VectorService, VectorStore};
use std::sync::Arc;

/// Outcome of the startup connection attempt.
pub enum StoreState {
    Ready(VectorStore),
    Unavailable(String),
}

impl StoreState {
    /// Connect and make sure both collections exist. A failure is kept, not
    /// returned, so the application can still start in a degraded state.
    pub fn connect(service: Arc<dyn VectorService>, collections: Collections) -> Self {
        match VectorStore::connect(service, collections) {
            Ok(store) => {
                tracing::info!(
                    face = store.collection_name(rollcall_store::CollectionKind::Face),
                    attendance = store.collection_name(rollcall_store::CollectionKind::Attendance),
                    dimension = store.dimension(),
                    "vector store ready"
                );
                Self::Ready(store)
            }
            Err(e) => {
                tracing::error!(error = %e, "vector store unavailable; workflows disabled");
                Self::Unavailable(e.to_string())
            }
        }
    }

    pub fn get(&self) -> Result<&VectorStore, AppError> {
        match self {
            Self::Ready(store) => Ok(store),
            Self::Unavailable(reason) => Err(AppError::StoreUnavailable(reason.clone())),
        }
    }
}

pub enum Request {
    Status,
    EnrollFromImage {
        name: String,
        roll_no: String,
        image: RgbImage,
    },
    EnrollLive {
        name: String,
        roll_no: String,
        source: Box<dyn FrameSource + Send>,
    },
    Recognize {
        image: RgbImage,
    },
    RecognizeLive {
        source: Box<dyn FrameSource + Send>,
    },
    /// Record attendance for whoever the last live run recognized.
    MarkRecognized,
    MarkAttendance {
        name: String,
        roll_no: String,
    },
    ViewAttendance,
    UpdateRollNo {
        name: String,
        roll_no: String,
    },
    /// Must be sent twice in a row for the same name to take effect.
    DeleteStudent {
        name: String,
    },
    StopCamera,
}

impl Request {
    fn kind(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::EnrollFromImage { .. } => "enroll_image",
            Self::EnrollLive { .. } => "enroll_live",
            Self::Recognize { .. } => "recognize",
            Self::RecognizeLive { .. } => "recognize_live",
            Self::MarkRecognized => "mark_recognized",
            Self::MarkAttendance { .. } => "mark",
            Self::ViewAttendance => "view_attendance",
            Self::UpdateRollNo { .. } => "update_roll",
            Self::DeleteStudent { .. } => "delete",
            Self::StopCamera => "stop_camera",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub store_error: Option<String>,
    pub detector_error: Option<String>,
    pub dimension: usize,
}

#[derive(Debug)]
pub enum Response {
    Status(StatusReport),
    Enrolled(EnrollOutcome),
    Recognized(Vec<FaceLabel>),
    LiveFinished {
        summary: LiveSummary,
        recognized: Recognition,
    },
    Marked {
        name: String,
        outcome: MarkOutcome,
    },
    Attendance(AttendanceReport),
    RollUpdated(RollUpdate),
    ConfirmDelete {
        name: String,
    },
    Deleted {
        name: String,
    },
    CameraStopped,
}

pub struct Handler {
    store: StoreState,
    detector: Result<Box<dyn FaceDetector>, String>,
    extractor: FeatureExtractor,
    threshold: f32,
    sample_interval: usize,
}

impl Handler {
    pub fn new(
        store: StoreState,
        detector: Result<Box<dyn FaceDetector>, String>,
        extractor: FeatureExtractor,
        threshold: f32,
    ) -> Self {
        Self {
            store,
            detector,
            extractor,
            threshold,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }

    pub fn with_sample_interval(mut self, interval: usize) -> Self {
        self.sample_interval = interval.max(1);
        self
    }

    /// Connect to `service` and load the cascade model named in `config`.
    /// Neither failure is fatal; affected requests report it instead.
    pub fn from_config(config: &Config, service: Arc<dyn VectorService>) -> Self {
        let store = StoreState::connect(service, config.collections());

        let model = config.detector_model.to_string_lossy();
        let detector = match CascadeDetector::load(&model) {
            Ok(d) => {
                tracing::info!(path = %model, "face detector loaded");
                Ok(Box::new(d) as Box<dyn FaceDetector>)
            }
            Err(e) => {
                tracing::error!(path = %model, error = %e, "face detector unavailable");
                Err(e.to_string())
            }
        };

        Self::new(
            store,
            detector,
            FeatureExtractor::new(config.image_width, config.image_height),
            config.score_threshold,
        )
        .with_sample_interval(config.sample_interval)
    }

    pub fn handle(&mut self, session: &mut Session, request: Request) -> Result<Response, AppError> {
        tracing::debug!(request = request.kind(), "handling request");
        // Any other request in between cancels a pending delete confirmation.
        let pending_delete = session.confirm_delete.take();

        let Self {
            store,
            detector,
            extractor,
            threshold,
            sample_interval,
        } = self;
        let threshold = *threshold;

        match request {
            Request::Status => Ok(Response::Status(StatusReport {
                store_error: store.get().err().map(|e| e.to_string()),
                detector_error: detector.as_ref().err().cloned(),
                dimension: extractor.dimension(),
            })),

            Request::StopCamera => {
                session.stop.raise();
                session.stop_camera();
                Ok(Response::CameraStopped)
            }

            Request::EnrollFromImage {
                name,
                roll_no,
                image,
            } => {
                let store = store.get()?;
                let detector = detector_mut(detector)?;
                remember_inputs(session, &name, &roll_no);
                enroll_single_capture(store, detector, extractor, &image, &name, &roll_no)
                    .map(Response::Enrolled)
            }

            Request::EnrollLive {
                name,
                roll_no,
                mut source,
            } => {
                let store = store.get()?;
                let detector = detector_mut(detector)?;
                remember_inputs(session, &name, &roll_no);
                start_camera(session)?;
                let result = enroll_live(
                    store,
                    detector,
                    extractor,
                    source.as_mut(),
                    &session.stop,
                    *sample_interval,
                    &name,
                    &roll_no,
                );
                session.stop_camera();
                result.map(Response::Enrolled)
            }

            Request::Recognize { image } => {
                let store = store.get()?;
                let detector = detector_mut(detector)?;
                recognize_image(store, detector, extractor, &image, threshold).map(Response::Recognized)
            }

            Request::RecognizeLive { mut source } => {
                let store = store.get()?;
                let detector = detector_mut(detector)?;
                start_camera(session)?;
                let result = recognize_live(store, detector, extractor, source.as_mut(), session, threshold);
                session.stop_camera();
                result.map(|summary| Response::LiveFinished {
                    summary,
                    recognized: session.recognized.clone(),
                })
            }

            Request::MarkRecognized => {
                let store = store.get()?;
                if session.camera_on {
                    return Err(ValidationError::CameraBusy.into());
                }
                if !session.recognized.is_known() {
                    return Err(ValidationError::NothingRecognized.into());
                }
                let who = std::mem::take(&mut session.recognized);
                let outcome = mark_attendance(store, &who.name, &who.roll_no)?;
                Ok(Response::Marked {
                    name: who.name,
                    outcome,
                })
            }

            Request::MarkAttendance { name, roll_no } => {
                let store = store.get()?;
                let (name, roll_no) = crate::enroll::validate_student(&name, &roll_no)?;
                let outcome = mark_attendance(store, &name, &roll_no)?;
                Ok(Response::Marked { name, outcome })
            }

            Request::ViewAttendance => {
                let store = store.get()?;
                let rows = get_all_attendance_records(store)?;
                Ok(Response::Attendance(AttendanceReport::build(&rows)))
            }

            Request::UpdateRollNo { name, roll_no } => {
                let store = store.get()?;
                update_student_roll_no(store, &name, &roll_no).map(Response::RollUpdated)
            }

            Request::DeleteStudent { name } => {
                let store = store.get()?;
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(ValidationError::MissingField("name").into());
                }
                if pending_delete.as_deref() == Some(name.as_str()) {
                    delete_student_data(store, &name)?;
                    Ok(Response::Deleted { name })
                } else {
                    tracing::info!(student = %name, "delete requested; awaiting confirmation");
                    session.confirm_delete = Some(name.clone());
                    Ok(Response::ConfirmDelete { name })
                }
            }
        }
    }
}

fn detector_mut(
    detector: &mut Result<Box<dyn FaceDetector>, String>,
) -> Result<&mut dyn FaceDetector, AppError> {
    match detector {
        Ok(d) => Ok(d.as_mut()),
        Err(reason) => Err(AppError::DetectorUnavailable(reason.clone())),
    }
}

fn remember_inputs(session: &mut Session, name: &str, roll_no: &str) {
    session.name = name.to_string();
    session.roll_no = roll_no.to_string();
}

fn start_camera(session: &mut Session) -> Result<(), AppError> {
    if session.camera_on {
        return Err(ValidationError::CameraBusy.into());
    }
    session.start_camera();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enroll::ENROLL_SAMPLE_COUNT;
    use crate::testing::*;
    use rollcall_core::frames::MemorySource;
    use rollcall_store::MemoryService;

    fn handler_with(detector: ScriptedDetector) -> (Arc<MemoryService>, Handler) {
        let (svc, store) = memory_store();
        let handler = Handler::new(
            StoreState::Ready(store),
            Ok(Box::new(detector) as Box<dyn FaceDetector>),
            extractor(),
            0.8,
        );
        (svc, handler)
    }

    fn enroll_image(handler: &mut Handler, session: &mut Session, name: &str, roll: &str, rgb: [u8; 3]) {
        let response = handler
            .handle(
                session,
                Request::EnrollFromImage {
                    name: name.into(),
                    roll_no: roll.into(),
                    image: solid(rgb),
                },
            )
            .unwrap();
        assert!(matches!(response, Response::Enrolled(EnrollOutcome { uploaded: ENROLL_SAMPLE_COUNT, .. })));
    }

    #[test]
    fn test_enroll_recognize_mark_view() {
        let (svc, mut handler) = handler_with(ScriptedDetector::one_face());
        let mut session = Session::new();
        enroll_image(&mut handler, &mut session, "A_B", "1", [10, 20, 30]);
        assert_eq!(session.name, "A_B");

        let response = handler
            .handle(
                &mut session,
                Request::RecognizeLive {
                    source: Box::new(MemorySource::repeat(solid([10, 20, 30]), 3)),
                },
            )
            .unwrap();
        match response {
            Response::LiveFinished { summary, recognized } => {
                assert_eq!(summary.frames, 3);
                assert_eq!(recognized.name, "A_B");
                assert_eq!(recognized.roll_no, "1");
            }
            other => panic!("unexpected response {other:?}"),
        }
        assert!(!session.camera_on);

        let marked = handler.handle(&mut session, Request::MarkRecognized).unwrap();
        assert!(matches!(marked, Response::Marked { outcome: MarkOutcome::Recorded { .. }, .. }));
        assert!(!session.recognized.is_known());

        // Second mark the same day through the explicit request.
        let again = handler
            .handle(
                &mut session,
                Request::MarkAttendance { name: "A_B".into(), roll_no: "1".into() },
            )
            .unwrap();
        assert!(matches!(again, Response::Marked { outcome: MarkOutcome::AlreadyMarked { .. }, .. }));
        assert_eq!(svc.count(ATTENDANCE_COLLECTION), 1);

        match handler.handle(&mut session, Request::ViewAttendance).unwrap() {
            Response::Attendance(report) => {
                assert_eq!(report.latest.len(), 1);
                assert_eq!(report.totals[0].name, "A_B");
                assert_eq!(report.totals[0].total, 1);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn test_mark_recognized_requires_known_identity() {
        let (_svc, mut handler) = handler_with(ScriptedDetector::one_face());
        let mut session = Session::new();
        let err = handler.handle(&mut session, Request::MarkRecognized).unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::NothingRecognized)));
    }

    #[test]
    fn test_unknown_face_under_threshold() {
        let (_svc, mut handler) = handler_with(ScriptedDetector::one_face());
        let mut session = Session::new();
        enroll_image(&mut handler, &mut session, "A_B", "1", [10, 20, 30]);

        match handler.handle(&mut session, Request::Recognize { image: solid([30, 20, 10]) }).unwrap() {
            Response::Recognized(labels) => {
                assert_eq!(labels.len(), 1);
                assert!(!labels[0].recognition.is_known());
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn test_live_request_rejected_while_camera_on() {
        let (_svc, mut handler) = handler_with(ScriptedDetector::one_face());
        let mut session = Session::new();
        session.camera_on = true;
        let err = handler
            .handle(
                &mut session,
                Request::RecognizeLive { source: Box::new(MemorySource::new(vec![])) },
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::CameraBusy)));

        assert!(matches!(
            handler.handle(&mut session, Request::StopCamera).unwrap(),
            Response::CameraStopped
        ));
        assert!(!session.camera_on);
        assert!(session.stop.is_raised());
    }

    #[test]
    fn test_incomplete_live_enrollment_resets_camera() {
        let (svc, mut handler) = handler_with(ScriptedDetector::one_face());
        let mut session = Session::new();
        let err = handler
            .handle(
                &mut session,
                Request::EnrollLive {
                    name: "A_B".into(),
                    roll_no: "1".into(),
                    source: Box::new(MemorySource::repeat(solid([1, 2, 3]), 20)),
                },
            )
            .unwrap_err();
        assert!(matches!(err, AppError::EnrollmentIncomplete { collected: 2, .. }));
        assert!(!session.camera_on);
        assert_eq!(svc.count(FACE_COLLECTION), 0);
    }

    #[test]
    fn test_delete_needs_confirmation() {
        let (svc, mut handler) = handler_with(ScriptedDetector::one_face());
        let mut session = Session::new();
        enroll_image(&mut handler, &mut session, "A_B", "1", [10, 20, 30]);
        enroll_image(&mut handler, &mut session, "C_D", "2", [200, 0, 0]);

        let delete = || Request::DeleteStudent { name: "A_B".into() };

        assert!(matches!(handler.handle(&mut session, delete()).unwrap(), Response::ConfirmDelete { .. }));
        assert_eq!(svc.count(FACE_COLLECTION), 2 * ENROLL_SAMPLE_COUNT);

        // An unrelated request disarms the confirmation.
        handler.handle(&mut session, Request::Status).unwrap();
        assert!(matches!(handler.handle(&mut session, delete()).unwrap(), Response::ConfirmDelete { .. }));

        assert!(matches!(handler.handle(&mut session, delete()).unwrap(), Response::Deleted { .. }));
        assert_eq!(svc.count(FACE_COLLECTION), ENROLL_SAMPLE_COUNT);
        assert!(session.confirm_delete.is_none());
    }

    #[test]
    fn test_roll_update_request() {
        let (_svc, mut handler) = handler_with(ScriptedDetector::one_face());
        let mut session = Session::new();
        enroll_image(&mut handler, &mut session, "A_B", "1", [10, 20, 30]);
        handler
            .handle(&mut session, Request::MarkAttendance { name: "A_B".into(), roll_no: "1".into() })
            .unwrap();

        let response = handler
            .handle(&mut session, Request::UpdateRollNo { name: "A_B".into(), roll_no: "2".into() })
            .unwrap();
        assert!(matches!(
            response,
            Response::RollUpdated(RollUpdate { face_records: ENROLL_SAMPLE_COUNT, attendance_records: 1 })
        ));

        match handler.handle(&mut session, Request::Recognize { image: solid([10, 20, 30]) }).unwrap() {
            Response::Recognized(labels) => assert_eq!(labels[0].recognition.roll_no, "2"),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn test_unavailable_store_short_circuits() {
        let mut handler = Handler::new(
            StoreState::Unavailable("connection refused".into()),
            Ok(Box::new(ScriptedDetector::one_face()) as Box<dyn FaceDetector>),
            extractor(),
            0.8,
        );
        let mut session = Session::new();

        for request in [
            Request::ViewAttendance,
            Request::MarkAttendance { name: "A_B".into(), roll_no: "1".into() },
            Request::Recognize { image: solid([1, 1, 1]) },
        ] {
            let err = handler.handle(&mut session, request).unwrap_err();
            assert!(matches!(err, AppError::StoreUnavailable(_)));
        }

        match handler.handle(&mut session, Request::Status).unwrap() {
            Response::Status(status) => {
                assert_eq!(status.store_error.as_deref(), Some("vector store unavailable: connection refused"));
                assert!(status.detector_error.is_none());
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn test_store_connect_failure_is_degraded() {
        let svc = Arc::new(MemoryService::new());
        svc.set_unavailable(true);
        let state = StoreState::connect(
            svc,
            Collections { face: "f".into(), attendance: "a".into(), dimension: 12 },
        );
        assert!(matches!(state.get(), Err(AppError::StoreUnavailable(_))));
    }

    #[test]
    fn test_missing_detector_reported() {
        let (_svc, store) = memory_store();
        let mut handler = Handler::new(StoreState::Ready(store), Err("model missing".into()), extractor(), 0.8);
        let err = handler
            .handle(&mut Session::new(), Request::Recognize { image: solid([1, 1, 1]) })
            .unwrap_err();
        assert!(matches!(err, AppError::DetectorUnavailable(_)));
    }
}
