//! Roll-number changes and student removal, applied to both collections.
//!
//! The collections share no referential integrity, so each operation walks
//! the face collection first and the attendance collection second. A failure
//! stops the walk; whatever was already changed stays changed.

use crate::enroll::validate_student;
use crate::error::{AppError, ValidationError};
use rollcall_store::records::{face_metadata, STUDENT_NAME};
use rollcall_store::store::MAX_TOP_K;
use rollcall_store::{AttendanceRecord, CollectionKind, Filter, VectorStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollUpdate {
    pub face_records: usize,
    pub attendance_records: usize,
}

/// Rewrite the roll number on every record of `name`.
pub fn update_student_roll_no(
    store: &VectorStore,
    name: &str,
    new_roll_no: &str,
) -> Result<RollUpdate, AppError> {
    let (name, new_roll_no) = validate_student(name, new_roll_no)?;
    let filter = Filter::eq(STUDENT_NAME, &name);
    let placeholder = store.placeholder_vector();
    let mut update = RollUpdate::default();

    let faces = store.query_nearest(CollectionKind::Face, &placeholder, MAX_TOP_K, Some(&filter))?;
    if faces.is_empty() {
        tracing::warn!(student = %name, "no face vectors found");
    }
    let metadata = face_metadata(&name, &new_roll_no);
    for hit in &faces {
        store.update_metadata(CollectionKind::Face, &hit.id, &metadata)?;
        update.face_records += 1;
    }
    tracing::info!(student = %name, roll_no = %new_roll_no, count = update.face_records, "face vectors updated");

    let days = store.query_nearest(CollectionKind::Attendance, &placeholder, MAX_TOP_K, Some(&filter))?;
    for hit in &days {
        let record = AttendanceRecord {
            student_name: name.clone(),
            ..AttendanceRecord::from_metadata(&hit.id, &hit.metadata)
        }
        .with_roll_no(&new_roll_no);
        store.update_metadata(CollectionKind::Attendance, &hit.id, &record.metadata())?;
        update.attendance_records += 1;
    }
    tracing::info!(
        student = %name,
        roll_no = %new_roll_no,
        count = update.attendance_records,
        "attendance records updated"
    );

    Ok(update)
}

/// Remove every face vector and attendance record of `name`.
pub fn delete_student_data(store: &VectorStore, name: &str) -> Result<(), AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingField("name").into());
    }
    let filter = Filter::eq(STUDENT_NAME, name);
    store.delete_by_filter(CollectionKind::Face, &filter)?;
    store.delete_by_filter(CollectionKind::Attendance, &filter)?;
    tracing::info!(student = name, "student data deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::mark_attendance_at;
    use crate::testing::*;
    use chrono::NaiveDate;
    use rollcall_core::FeatureVector;
    use rollcall_store::service::Record;
    use rollcall_store::FaceEntry;
    use serde_json::Value;

    fn seed(store: &VectorStore, name: &str, roll: &str, samples: usize, days: &[u32]) {
        let entries = (0..samples)
            .map(|i| FaceEntry::new(name, roll, FeatureVector::new(vec![i as f32 + 1.0; store.dimension()])))
            .collect();
        store.upsert_face_batch(entries).unwrap();
        for &day in days {
            let at = NaiveDate::from_ymd_opt(2026, 3, day)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap();
            mark_attendance_at(store, name, roll, at).unwrap();
        }
    }

    fn field<'a>(r: &'a Record, key: &str) -> &'a str {
        r.metadata.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    fn of<'a>(records: &'a [Record], name: &'a str) -> impl Iterator<Item = &'a Record> + 'a {
        records.iter().filter(move |r| field(r, "student_name") == name)
    }

    #[test]
    fn test_roll_update_reaches_both_collections() {
        let (svc, store) = memory_store();
        seed(&store, "A_B", "1", 5, &[1, 2]);
        seed(&store, "C_D", "7", 3, &[1]);

        let update = update_student_roll_no(&store, "A_B", "2").unwrap();
        assert_eq!(update, RollUpdate { face_records: 5, attendance_records: 2 });

        let faces = svc.records(FACE_COLLECTION);
        assert!(of(&faces, "A_B").all(|r| field(r, "roll_no") == "2"));
        assert!(of(&faces, "C_D").all(|r| field(r, "roll_no") == "7"));

        let days = svc.records(ATTENDANCE_COLLECTION);
        assert_eq!(of(&days, "A_B").count(), 2);
        for r in of(&days, "A_B") {
            assert_eq!(field(r, "roll_no"), "2");
            assert_eq!(field(r, "time"), "09:00:00");
            assert!(field(r, "date").ends_with("-03-2026"));
        }
        assert!(of(&days, "C_D").all(|r| field(r, "roll_no") == "7"));
    }

    #[test]
    fn test_roll_update_unknown_student() {
        let (_svc, store) = memory_store();
        assert_eq!(update_student_roll_no(&store, "Nobody", "3").unwrap(), RollUpdate::default());
    }

    #[test]
    fn test_roll_update_requires_inputs() {
        let (_svc, store) = memory_store();
        assert!(matches!(
            update_student_roll_no(&store, "A_B", " "),
            Err(AppError::Validation(ValidationError::MissingField(_)))
        ));
    }

    #[test]
    fn test_delete_only_target_student() {
        let (svc, store) = memory_store();
        seed(&store, "A_B", "1", 4, &[1, 2]);
        seed(&store, "C_D", "2", 3, &[1]);

        delete_student_data(&store, "A_B").unwrap();

        let faces = svc.records(FACE_COLLECTION);
        let days = svc.records(ATTENDANCE_COLLECTION);
        assert_eq!(of(&faces, "A_B").count(), 0);
        assert_eq!(of(&days, "A_B").count(), 0);
        assert_eq!(of(&faces, "C_D").count(), 3);
        assert_eq!(of(&days, "C_D").count(), 1);
    }

    #[test]
    fn test_delete_store_failure() {
        let (svc, store) = memory_store();
        svc.set_unavailable(true);
        assert!(matches!(delete_student_data(&store, "A_B"), Err(AppError::Store(_))));
    }
}
