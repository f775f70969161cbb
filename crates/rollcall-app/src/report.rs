//! Attendance summaries and CSV export.

use crate::attendance::DATE_FORMAT;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;

pub const CSV_HEADER: [&str; 3] = ["Roll No", "Name", "Total Attendance"];

/// One attendance record flattened for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRow {
    pub roll_no: String,
    pub name: String,
    /// `DD-MM-YYYY`
    pub date: String,
    pub time: String,
    pub record_id: String,
}

impl AttendanceRow {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, DATE_FORMAT).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentTotal {
    pub roll_no: String,
    pub name: String,
    pub total: usize,
}

/// Sort key for roll numbers: numeric ones order numerically and come
/// before anything else.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RollKey {
    Number(i64),
    Text(String),
}

impl RollKey {
    fn parse(roll_no: &str) -> Self {
        let trimmed = roll_no.trim();
        match trimmed.parse() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Text(trimmed.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttendanceReport {
    /// Most recent date present in the records.
    pub latest_date: Option<NaiveDate>,
    /// Rows from `latest_date`, by roll number.
    pub latest: Vec<AttendanceRow>,
    /// Days attended per student across all history, by roll number.
    pub totals: Vec<StudentTotal>,
}

impl AttendanceReport {
    pub fn build(rows: &[AttendanceRow]) -> Self {
        let latest_date = rows.iter().filter_map(AttendanceRow::parsed_date).max();

        let mut latest: Vec<AttendanceRow> = match latest_date {
            Some(day) => rows
                .iter()
                .filter(|r| r.parsed_date() == Some(day))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        latest.sort_by(|a, b| {
            RollKey::parse(&a.roll_no)
                .cmp(&RollKey::parse(&b.roll_no))
                .then_with(|| a.name.cmp(&b.name))
        });

        // Grouped on the roll number as stored, so "01" and "1" stay apart.
        let mut counts: BTreeMap<(RollKey, String, String), usize> = BTreeMap::new();
        for row in rows {
            let roll_no = row.roll_no.trim();
            *counts
                .entry((RollKey::parse(roll_no), roll_no.to_string(), row.name.clone()))
                .or_default() += 1;
        }
        let totals = counts
            .into_iter()
            .map(|((_, roll_no, name), total)| StudentTotal {
                roll_no,
                name,
                total,
            })
            .collect();

        Self {
            latest_date,
            latest,
            totals,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Write the per-student totals as CSV with a [`CSV_HEADER`] row.
    pub fn write_totals_csv<W: io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(CSV_HEADER)?;
        for t in &self.totals {
            let total = t.total.to_string();
            wtr.write_record([t.roll_no.as_str(), t.name.as_str(), total.as_str()])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// `attendance_data_YYYYMMDD_HHMMSS.csv`
pub fn default_csv_file_name(now: NaiveDateTime) -> String {
    format!("attendance_data_{}.csv", now.format("%Y%m%d_%H%M%S"))
}
