//! Domain records and their metadata layout.

use crate::service::{Metadata, Record};
use rollcall_core::FeatureVector;
use serde_json::Value;

pub const STUDENT_NAME: &str = "student_name";
pub const ROLL_NO: &str = "roll_no";
pub const DATE: &str = "date";
pub const TIME: &str = "time";

/// One face sample waiting to be written to the face collection.
#[derive(Debug, Clone)]
pub struct FaceEntry {
    pub student_name: String,
    pub roll_no: String,
    pub vector: FeatureVector,
}

impl FaceEntry {
    pub fn new(student_name: &str, roll_no: &str, vector: FeatureVector) -> Self {
        Self {
            student_name: student_name.to_string(),
            roll_no: roll_no.to_string(),
            vector,
        }
    }

    /// Assign a fresh id (`{name}_{uuid}`) and build the storable record.
    pub fn into_record(self) -> Record {
        Record {
            id: format!("{}_{}", self.student_name, uuid::Uuid::new_v4()),
            metadata: face_metadata(&self.student_name, &self.roll_no),
            values: self.vector.values,
        }
    }
}

pub fn face_metadata(student_name: &str, roll_no: &str) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert(STUDENT_NAME.into(), Value::String(student_name.to_string()));
    meta.insert(ROLL_NO.into(), Value::String(roll_no.to_string()));
    meta
}

/// One student's presence on one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub id: String,
    pub student_name: String,
    pub roll_no: String,
    /// `DD-MM-YYYY`
    pub date: String,
    /// `HH:MM:SS`
    pub time: String,
}

impl AttendanceRecord {
    pub fn metadata(&self) -> Metadata {
        let mut meta = face_metadata(&self.student_name, &self.roll_no);
        meta.insert(DATE.into(), Value::String(self.date.clone()));
        meta.insert(TIME.into(), Value::String(self.time.clone()));
        meta
    }

    /// Rebuild from a stored record. Absent fields come back empty.
    pub fn from_metadata(id: &str, meta: &Metadata) -> Self {
        let field = |key: &str| {
            meta.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            id: id.to_string(),
            student_name: field(STUDENT_NAME),
            roll_no: field(ROLL_NO),
            date: field(DATE),
            time: field(TIME),
        }
    }

    /// Same record with a new roll number.
    pub fn with_roll_no(&self, roll_no: &str) -> Self {
        Self {
            roll_no: roll_no.to_string(),
            ..self.clone()
        }
    }
}
