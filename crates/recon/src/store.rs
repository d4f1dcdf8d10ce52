//! Caller-side persistence contract for reconciled records.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::model::PolicyRecord;

/// A stored record and the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub revision: u64,
    pub record: PolicyRecord,
}

/// Revisioned record store.
pub trait RecordStore {
    fn get(&self, record_id: &str) -> Result<Option<StoredRecord>, StoreError>;

    /// Write `record` only if the current revision equals `expected`
    /// (`None`: the record must not exist yet). Returns the new revision.
    fn compare_and_swap(
        &self,
        record_id: &str,
        expected: Option<u64>,
        record: PolicyRecord,
    ) -> Result<u64, StoreError>;
}

/// Process-local store. Revisions start at 1 and increase by one per write.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<String, StoredRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryStore {
    fn get(&self, record_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.records.lock().get(record_id).cloned())
    }

    fn compare_and_swap(
        &self,
        record_id: &str,
        expected: Option<u64>,
        record: PolicyRecord,
    ) -> Result<u64, StoreError> {
        let mut records = self.records.lock();
        let actual = records.get(record_id).map(|s| s.revision);
        if actual != expected {
            log::debug!("record {record_id}: CAS rejected (expected {expected:?}, found {actual:?})");
            return Err(StoreError::RevisionConflict {
                record_id: record_id.into(),
                expected,
                actual,
            });
        }

        let revision = actual.map_or(1, |r| r + 1);
        records.insert(record_id.to_string(), StoredRecord { revision, record });
        Ok(revision)
    }
}
