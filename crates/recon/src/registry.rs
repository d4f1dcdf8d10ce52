//! Confirmation registry: which `(record, field)` pairs a human has locked.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::RegistryError;
use crate::model::{ConfirmedField, ConfirmedFields, FieldValue, LogicalField};

/// Store of confirmed fields.
///
/// Entries are never mutated in place: `unconfirm` followed by `confirm`
/// creates a fresh entry.
pub trait ConfirmationRegistry {
    fn list_confirmed(&self, record_id: &str) -> Result<Vec<ConfirmedField>, RegistryError>;

    /// Lock `value` for `(record_id, field)`. A second confirm of the same
    /// pair fails with the recoverable [`RegistryError::AlreadyConfirmed`].
    fn confirm(
        &self,
        record_id: &str,
        field: LogicalField,
        value: FieldValue,
        actor: &str,
    ) -> Result<ConfirmedField, RegistryError>;

    /// Remove the lock. Removing an absent entry is a no-op.
    fn unconfirm(&self, record_id: &str, field: LogicalField) -> Result<(), RegistryError>;
}

/// Read the confirmation state of one record in the shape `reconcile` takes.
pub fn load_confirmed<R: ConfirmationRegistry + ?Sized>(
    registry: &R,
    record_id: &str,
) -> Result<ConfirmedFields, RegistryError> {
    Ok(registry
        .list_confirmed(record_id)?
        .into_iter()
        .map(|entry| (entry.field, entry))
        .collect())
}

type EntryKey = (String, LogicalField);

/// Process-local registry, unique on `(record_id, field)`.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: Mutex<BTreeMap<EntryKey, ConfirmedField>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `confirm` with an explicit timestamp.
    pub fn confirm_at(
        &self,
        record_id: &str,
        field: LogicalField,
        value: FieldValue,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<ConfirmedField, RegistryError> {
        if value.is_empty() {
            return Err(RegistryError::EmptyValue {
                record_id: record_id.into(),
                field,
            });
        }
        if !value.fits(field.kind()) {
            return Err(RegistryError::TypeMismatch {
                record_id: record_id.into(),
                field,
            });
        }

        let mut entries = self.entries.lock();
        let key = (record_id.to_string(), field);
        if entries.contains_key(&key) {
            log::debug!("record {record_id}: {field} already confirmed");
            return Err(RegistryError::AlreadyConfirmed {
                record_id: record_id.into(),
                field,
            });
        }

        let entry = ConfirmedField {
            record_id: record_id.into(),
            field,
            value,
            confirmed_at: at,
            confirmed_by: actor.into(),
        };
        entries.insert(key, entry.clone());
        log::info!("record {record_id}: {field} confirmed by {actor}");
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ConfirmationRegistry for InMemoryRegistry {
    fn list_confirmed(&self, record_id: &str) -> Result<Vec<ConfirmedField>, RegistryError> {
        Ok(self
            .entries
            .lock()
            .values()
            .filter(|e| e.record_id == record_id)
            .cloned()
            .collect())
    }

    fn confirm(
        &self,
        record_id: &str,
        field: LogicalField,
        value: FieldValue,
        actor: &str,
    ) -> Result<ConfirmedField, RegistryError> {
        self.confirm_at(record_id, field, value, actor, Utc::now())
    }

    fn unconfirm(&self, record_id: &str, field: LogicalField) -> Result<(), RegistryError> {
        if self
            .entries
            .lock()
            .remove(&(record_id.to_string(), field))
            .is_some()
        {
            log::info!("record {record_id}: {field} unconfirmed");
        }
        Ok(())
    }
}
