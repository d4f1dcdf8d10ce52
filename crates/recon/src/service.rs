//! Caller-side orchestration: read, reconcile, write back under a revision
//! check, and route human confirmations to the registry.

use serde_json::Value;

use crate::config::ReconcileConfig;
use crate::engine::Reconciler;
use crate::error::{ServiceError, StoreError};
use crate::extract::RawCandidate;
use crate::model::{ConfirmedField, LogicalField, ValidationResult};
use crate::registry::{load_confirmed, ConfirmationRegistry};
use crate::store::RecordStore;

/// Result of one `reconcile_and_store` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub result: ValidationResult,
    /// A new revision was written.
    pub persisted: bool,
    /// Revision of the stored record after the call, if one exists.
    pub revision: Option<u64>,
    /// Read-reconcile-write rounds used.
    pub attempts: u32,
}

pub struct ReconcileService<S, R> {
    store: S,
    registry: R,
    config: ReconcileConfig,
}

impl<S: RecordStore, R: ConfirmationRegistry> ReconcileService<S, R> {
    pub fn new(store: S, registry: R, config: ReconcileConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Reconcile `raw` into the record and persist the merged result when it
    /// has no blocking errors and differs from what is stored.
    ///
    /// If another writer moves the revision between read and write, the
    /// record and confirmations are re-read and reconciliation re-runs, up
    /// to `service.max_cas_retries` rounds.
    pub fn reconcile_and_store(
        &self,
        record_id: &str,
        raw: &Value,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let candidate = RawCandidate::from_value(raw.clone())?;
        self.reconcile_candidate_and_store(record_id, &candidate)
    }

    pub fn reconcile_candidate_and_store(
        &self,
        record_id: &str,
        candidate: &RawCandidate,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let reconciler = Reconciler::new(&self.config);
        let max_attempts = self.config.service.max_cas_retries;

        for attempt in 1..=max_attempts {
            let stored = self.store.get(record_id)?;
            let confirmed = load_confirmed(&self.registry, record_id)?;
            let expected = stored.as_ref().map(|s| s.revision);
            let existing = stored.map(|s| s.record);

            let result = reconciler.reconcile(candidate, existing.as_ref(), &confirmed)?;

            if !result.is_valid {
                log::info!(
                    "record {record_id}: not persisted, {} blocking error(s)",
                    result.errors.len()
                );
                return Ok(ReconcileOutcome {
                    result,
                    persisted: false,
                    revision: expected,
                    attempts: attempt,
                });
            }

            if existing.as_ref() == Some(&result.normalized_data) {
                log::debug!("record {record_id}: reconciliation produced no change");
                return Ok(ReconcileOutcome {
                    result,
                    persisted: false,
                    revision: expected,
                    attempts: attempt,
                });
            }

            match self
                .store
                .compare_and_swap(record_id, expected, result.normalized_data.clone())
            {
                Ok(revision) => {
                    log::info!(
                        "record {record_id}: stored revision {revision} (quality {}, {} pending review)",
                        result.metadata.extraction_quality,
                        result.pending_review.len()
                    );
                    return Ok(ReconcileOutcome {
                        result,
                        persisted: true,
                        revision: Some(revision),
                        attempts: attempt,
                    });
                }
                Err(StoreError::RevisionConflict { .. }) => {
                    log::warn!(
                        "record {record_id}: revision moved during reconciliation (attempt {attempt}/{max_attempts})"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::RetriesExhausted {
            record_id: record_id.into(),
            attempts: max_attempts,
        })
    }

    /// Lock the currently stored value of `field`.
    pub fn confirm_field(
        &self,
        record_id: &str,
        field: LogicalField,
        actor: &str,
    ) -> Result<ConfirmedField, ServiceError> {
        let value = self
            .store
            .get(record_id)?
            .and_then(|s| s.record.get(field))
            .ok_or_else(|| ServiceError::NothingToConfirm {
                record_id: record_id.into(),
                field,
            })?;
        Ok(self.registry.confirm(record_id, field, value, actor)?)
    }

    pub fn unconfirm_field(&self, record_id: &str, field: LogicalField) -> Result<(), ServiceError> {
        Ok(self.registry.unconfirm(record_id, field)?)
    }
}
