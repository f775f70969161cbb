//! Daily attendance records.
//!
//! One record per student per calendar day, keyed `{name}_{DD-MM-YYYY}`.
//! The stored vector is a constant placeholder; only the metadata matters.

use crate::error::AppError;
use crate::report::AttendanceRow;
use chrono::{Local, NaiveDate, NaiveDateTime};
use rollcall_store::records::{DATE, ROLL_NO, STUDENT_NAME, TIME};
use rollcall_store::service::Record;
use rollcall_store::{AttendanceRecord, CollectionKind, VectorStore};
use serde_json::Value;

pub const DATE_FORMAT: &str = "%d-%m-%Y";
pub const TIME_FORMAT: &str = "%H:%M:%S";
/// Shown for any metadata field a stored record lacks.
pub const MISSING_FIELD: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    Recorded { id: String, time: String },
    AlreadyMarked { id: String },
}

impl MarkOutcome {
    pub fn id(&self) -> &str {
        match self {
            Self::Recorded { id, .. } | Self::AlreadyMarked { id } => id,
        }
    }
}

pub fn attendance_id(name: &str, date: NaiveDate) -> String {
    format!("{}_{}", name, date.format(DATE_FORMAT))
}

/// Record attendance for today, local time.
pub fn mark_attendance(store: &VectorStore, name: &str, roll_no: &str) -> Result<MarkOutcome, AppError> {
    mark_attendance_at(store, name, roll_no, Local::now().naive_local())
}

/// Record attendance for the day of `at`. Marking the same student twice on
/// one day leaves the first record untouched.
pub fn mark_attendance_at(
    store: &VectorStore,
    name: &str,
    roll_no: &str,
    at: NaiveDateTime,
) -> Result<MarkOutcome, AppError> {
    let id = attendance_id(name, at.date());

    match store.fetch_by_id(CollectionKind::Attendance, &id) {
        Ok(Some(_)) => {
            tracing::info!(student = name, id = %id, "attendance already recorded today");
            return Ok(MarkOutcome::AlreadyMarked { id });
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(id = %id, error = %e, "attendance lookup failed; recording anyway");
        }
    }

    let record = AttendanceRecord {
        id: id.clone(),
        student_name: name.to_string(),
        roll_no: roll_no.to_string(),
        date: at.format(DATE_FORMAT).to_string(),
        time: at.format(TIME_FORMAT).to_string(),
    };
    store.upsert(
        CollectionKind::Attendance,
        &[Record {
            id: record.id.clone(),
            values: store.placeholder_vector(),
            metadata: record.metadata(),
        }],
    )?;

    tracing::info!(student = name, roll_no, id = %id, time = %record.time, "attendance recorded");
    Ok(MarkOutcome::Recorded { id, time: record.time })
}

/// Every stored attendance record as a flat row.
pub fn get_all_attendance_records(store: &VectorStore) -> Result<Vec<AttendanceRow>, AppError> {
    let records = store.scan_all(CollectionKind::Attendance)?;
    tracing::debug!(count = records.len(), "attendance records fetched");
    Ok(records.iter().map(row_from_record).collect())
}

fn row_from_record(record: &Record) -> AttendanceRow {
    let field = |key: &str| {
        record
            .metadata
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(MISSING_FIELD)
            .to_string()
    };
    AttendanceRow {
        roll_no: field(ROLL_NO),
        name: field(STUDENT_NAME),
        date: field(DATE),
        time: field(TIME),
        record_id: record.id.clone(),
    }
}
