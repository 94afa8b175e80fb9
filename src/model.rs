use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    /// Anything else found in persisted data. Never accepted by the store.
    Unrecognized(String),
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, AttendanceStatus::Unrecognized(_))
    }
}

impl From<String> for AttendanceStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "present" => AttendanceStatus::Present,
            "absent" => AttendanceStatus::Absent,
            "late" => AttendanceStatus::Late,
            _ => AttendanceStatus::Unrecognized(raw),
        }
    }
}

impl From<&str> for AttendanceStatus {
    fn from(raw: &str) -> Self {
        AttendanceStatus::from(raw.to_string())
    }
}

impl From<AttendanceStatus> for String {
    fn from(status: AttendanceStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(default)]
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub marked_by: String,
}

impl AttendanceRecord {
    pub fn batch_key(&self) -> BatchKey {
        BatchKey {
            date: self.date,
            class_id: self.class_id.clone(),
        }
    }

    /// Primary identity of a record; the id is secondary.
    pub fn identity(&self) -> (&str, &str, NaiveDate) {
        (&self.student_id, &self.class_id, self.date)
    }
}

pub fn new_record_id() -> String {
    format!("ATT-{}", Uuid::new_v4())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchKey {
    pub date: NaiveDate,
    pub class_id: String,
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.class_id, self.date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub student_id: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("attendance batch is empty")]
    EmptyBatch,
    #[error("attendance batch mixes keys {first} and {other}")]
    MixedKeys { first: BatchKey, other: BatchKey },
    #[error("student {student_id} appears more than once in batch {key}")]
    DuplicateStudent { key: BatchKey, student_id: String },
    #[error("student {student_id} has unrecognized status {status:?}")]
    UnrecognizedStatus { student_id: String, status: String },
    #[error("attendance store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Poisoned => "store_unavailable",
            _ => "invalid_batch",
        }
    }
}

/// The complete attendance of one class on one day.
///
/// Can only be built through the validating constructors, so every value that
/// reaches the store is non-empty, single-keyed and has one entry per student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceBatch {
    key: BatchKey,
    records: Vec<AttendanceRecord>,
}

impl AttendanceBatch {
    pub fn new(
        date: NaiveDate,
        class_id: impl Into<String>,
        marked_by: impl Into<String>,
        entries: impl IntoIterator<Item = BatchEntry>,
    ) -> Result<Self, StoreError> {
        let class_id = class_id.into();
        let marked_by = marked_by.into();
        let records = entries
            .into_iter()
            .map(|e| AttendanceRecord {
                id: String::new(),
                student_id: e.student_id,
                class_id: class_id.clone(),
                date,
                status: e.status,
                marked_by: marked_by.clone(),
            })
            .collect();
        Self::from_records(records)
    }

    pub fn from_records(records: Vec<AttendanceRecord>) -> Result<Self, StoreError> {
        let Some(first) = records.first() else {
            return Err(StoreError::EmptyBatch);
        };
        let key = first.batch_key();

        let mut seen: HashSet<&str> = HashSet::new();
        for r in &records {
            if r.date != key.date || r.class_id != key.class_id {
                return Err(StoreError::MixedKeys {
                    first: key.clone(),
                    other: r.batch_key(),
                });
            }
            if !r.status.is_recognized() {
                return Err(StoreError::UnrecognizedStatus {
                    student_id: r.student_id.clone(),
                    status: r.status.to_string(),
                });
            }
            if !seen.insert(r.student_id.as_str()) {
                return Err(StoreError::DuplicateStudent {
                    key: key.clone(),
                    student_id: r.student_id.clone(),
                });
            }
        }

        Ok(Self { key, records })
    }

    pub fn key(&self) -> &BatchKey {
        &self.key
    }

    pub(crate) fn into_records(self) -> Vec<AttendanceRecord> {
        self.records
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| date >= f) && self.to.map_or(true, |t| date <= t)
    }
}
