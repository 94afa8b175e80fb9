use crate::model::{new_record_id, AttendanceBatch, AttendanceRecord, DateRange, StoreError};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Durable load/save hook. The store never calls it on its own; the owner
/// decides when to load and when to write through.
pub trait AttendancePersistence {
    fn load_all(&self) -> anyhow::Result<Vec<AttendanceRecord>>;
    fn save_all(&self, records: &[AttendanceRecord]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceQuery {
    pub student_id: Option<String>,
    pub class_id: Option<String>,
    pub date_range: DateRange,
}

impl AttendanceQuery {
    pub fn student(student_id: impl Into<String>) -> Self {
        Self {
            student_id: Some(student_id.into()),
            ..Self::default()
        }
    }

    pub fn class(class_id: impl Into<String>) -> Self {
        Self {
            class_id: Some(class_id.into()),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, date_range: DateRange) -> Self {
        self.date_range = date_range;
        self
    }

    fn matches(&self, r: &AttendanceRecord) -> bool {
        self.student_id.as_deref().map_or(true, |s| r.student_id == s)
            && self.class_id.as_deref().map_or(true, |c| r.class_id == c)
            && self.date_range.contains(r.date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeTarget {
    Student(String),
    Class(String),
}

impl PurgeTarget {
    fn matches(&self, r: &AttendanceRecord) -> bool {
        match self {
            PurgeTarget::Student(id) => r.student_id == *id,
            PurgeTarget::Class(id) => r.class_id == *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSummary {
    pub date: NaiveDate,
    pub class_id: String,
    pub replaced: usize,
    pub inserted: usize,
}

/// Canonical attendance record set.
///
/// `submit_batch` and `purge` take the write lock for their whole effect, so
/// a reader never observes half of a replace.
#[derive(Debug, Default)]
pub struct AttendanceStore {
    records: RwLock<Vec<AttendanceRecord>>,
}

impl AttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<AttendanceRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn load(persistence: &dyn AttendancePersistence) -> anyhow::Result<Self> {
        let records = persistence.load_all()?;
        info!(count = records.len(), "loaded attendance records");
        Ok(Self::with_records(records))
    }

    pub fn save_to(&self, persistence: &dyn AttendancePersistence) -> anyhow::Result<()> {
        let guard = self.read()?;
        persistence.save_all(&guard)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<AttendanceRecord>>, StoreError> {
        self.records.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<AttendanceRecord>>, StoreError> {
        self.records.write().map_err(|_| StoreError::Poisoned)
    }

    /// Replaces everything stored for the batch's `(date, class)` with the batch.
    ///
    /// Students recorded earlier for that day and class but missing from the
    /// new batch lose their record. Ids are kept for students present in both.
    pub fn submit_batch(&self, batch: AttendanceBatch) -> Result<SubmitSummary, StoreError> {
        let key = batch.key().clone();
        let mut guard = self.write()?;

        let mut previous_ids: HashMap<String, String> = HashMap::new();
        let before = guard.len();
        guard.retain(|r| {
            if r.date == key.date && r.class_id == key.class_id {
                previous_ids.insert(r.student_id.clone(), r.id.clone());
                false
            } else {
                true
            }
        });
        let replaced = before - guard.len();

        // Ids come from the record being replaced or are minted here; any id
        // carried in on the batch is ignored.
        let mut inserted = 0;
        for mut record in batch.into_records() {
            record.id = match previous_ids.remove(&record.student_id) {
                Some(id) if !id.is_empty() => id,
                _ => new_record_id(),
            };
            guard.push(record);
            inserted += 1;
        }

        if !previous_ids.is_empty() {
            debug!(
                key = %key,
                dropped = previous_ids.len(),
                "resubmission dropped students missing from the new batch"
            );
        }
        info!(key = %key, replaced, inserted, "attendance batch committed");

        Ok(SubmitSummary {
            date: key.date,
            class_id: key.class_id,
            replaced,
            inserted,
        })
    }

    pub fn query(&self, filter: &AttendanceQuery) -> Result<Vec<AttendanceRecord>, StoreError> {
        let guard = self.read()?;
        Ok(guard.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    pub fn records_for_date(
        &self,
        date: NaiveDate,
        class_id: Option<&str>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let guard = self.read()?;
        Ok(guard
            .iter()
            .filter(|r| r.date == date && class_id.map_or(true, |c| r.class_id == c))
            .cloned()
            .collect())
    }

    pub fn purge(&self, target: &PurgeTarget) -> Result<usize, StoreError> {
        let removed = self.purge_where(|r| target.matches(r))?;
        info!(?target, removed, "purged attendance records");
        Ok(removed)
    }

    pub fn purge_where<F>(&self, mut predicate: F) -> Result<usize, StoreError>
    where
        F: FnMut(&AttendanceRecord) -> bool,
    {
        let mut guard = self.write()?;
        let before = guard.len();
        guard.retain(|r| !predicate(r));
        Ok(before - guard.len())
    }

    pub fn snapshot(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self.read()?.clone())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.read()?.is_empty())
    }
}
