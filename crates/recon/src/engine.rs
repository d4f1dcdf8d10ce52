use serde_json::Value;

use crate::config::ReconcileConfig;
use crate::cross::check_cross_fields;
use crate::error::ReconcileError;
use crate::extract::{FieldExtractor, RawCandidate};
use crate::model::{
    ConfirmedField, ConfirmedFields, FieldValue, Finding, FindingCode, LogicalField,
    PolicyRecord, ResultMetadata, Severity, ValidationResult,
};
use crate::normalize::{changed_by_normalization, normalize_field};
use crate::score::{quality_score, reliability, PenaltyTally};
use crate::validate::validate_field;

/// Reconcile a raw JSON candidate against the stored record and its
/// confirmation state. Fails only when `raw` is not a JSON object or the
/// confirmation map is inconsistent.
pub fn reconcile(
    raw: &Value,
    existing: Option<&PolicyRecord>,
    confirmed: &ConfirmedFields,
    config: &ReconcileConfig,
) -> Result<ValidationResult, ReconcileError> {
    let candidate = RawCandidate::from_value(raw.clone())?;
    Reconciler::new(config).reconcile(&candidate, existing, confirmed)
}

/// Same as [`reconcile`] for an already-typed candidate.
pub fn reconcile_candidate(
    candidate: &RawCandidate,
    existing: Option<&PolicyRecord>,
    confirmed: &ConfirmedFields,
    config: &ReconcileConfig,
) -> Result<ValidationResult, ReconcileError> {
    Reconciler::new(config).reconcile(candidate, existing, confirmed)
}

/// Config plus the alias table derived from it, reusable across calls.
#[derive(Debug, Clone)]
pub struct Reconciler<'a> {
    config: &'a ReconcileConfig,
    extractor: FieldExtractor,
}

/// Decision for one field.
#[derive(Debug, Default)]
struct FieldOutcome {
    merged: Option<FieldValue>,
    findings: Vec<Finding>,
    /// The incoming value became the merged value.
    adopted: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a ReconcileConfig) -> Self {
        Self {
            config,
            extractor: FieldExtractor::new(&config.aliases),
        }
    }

    pub fn reconcile(
        &self,
        candidate: &RawCandidate,
        existing: Option<&PolicyRecord>,
        confirmed: &ConfirmedFields,
    ) -> Result<ValidationResult, ReconcileError> {
        check_confirmed(confirmed)?;

        let mut merged = PolicyRecord::default();
        let mut findings = Vec::new();
        let mut fields_found = Vec::new();
        let mut fields_missing = Vec::new();
        let mut fields_normalized = Vec::new();

        for field in LogicalField::ALL {
            let raw_value = self.extractor.extract(candidate, field);
            let incoming = raw_value.and_then(|v| normalize_field(field, v, &self.config.limits));

            if incoming.is_some() {
                fields_found.push(field);
            } else {
                fields_missing.push(field);
            }

            let prior = existing.and_then(|r| r.get(field));
            let outcome = self.decide(field, incoming, prior, confirmed.get(&field));

            if outcome.adopted {
                if let (Some(raw), Some(value)) = (raw_value, &outcome.merged) {
                    if changed_by_normalization(raw, value) {
                        fields_normalized.push(field);
                    }
                }
            }
            if let Some(value) = outcome.merged {
                merged.set(field, value);
            }
            findings.extend(outcome.findings);
        }

        findings.extend(check_cross_fields(&merged, &self.config.tolerance));

        let tally = PenaltyTally::from_findings(&findings);
        let score = quality_score(&tally, &self.config.penalties);

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut pending_review = Vec::new();
        for finding in findings {
            match finding.code.severity() {
                Severity::Error => errors.push(finding),
                Severity::Warning => warnings.push(finding),
                Severity::Review => pending_review.push(finding),
            }
        }

        Ok(ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            pending_review,
            normalized_data: merged,
            metadata: ResultMetadata {
                source_reliability: reliability(score, &self.config.tiers),
                extraction_quality: score,
                fields_found,
                fields_missing,
                fields_normalized,
            },
        })
    }

    /// Merge decision for a single field.
    ///
    /// Confirmed values always win. Otherwise a new value is adopted only
    /// when nothing is stored or the stored value agrees; a disagreeing
    /// stored value is kept and flagged. Nothing is ever invented.
    fn decide(
        &self,
        field: LogicalField,
        incoming: Option<FieldValue>,
        prior: Option<FieldValue>,
        confirmed: Option<&ConfirmedField>,
    ) -> FieldOutcome {
        let mut outcome = FieldOutcome::default();

        if let Some(entry) = confirmed {
            if let Some(new) = incoming {
                if !new.agrees_with(&entry.value, field.kind()) {
                    outcome.findings.push(
                        Finding::new(
                            FindingCode::ConfirmedDivergence,
                            vec![field],
                            format!(
                                "{} confirmed by {}; incoming extraction '{new}' differs and was ignored",
                                field.label(),
                                entry.confirmed_by
                            ),
                        )
                        .with_values(entry.value.clone(), new),
                    );
                }
            }
            outcome.merged = Some(entry.value.clone());
            return outcome;
        }

        match (incoming, prior) {
            (Some(new), prior) => {
                if let Err(reason) = validate_field(field, &new, &self.config.limits) {
                    outcome.findings.push(Finding::new(
                        FindingCode::ValidationFailed,
                        vec![field],
                        reason,
                    ));
                }

                match prior {
                    Some(old) if !old.agrees_with(&new, field.kind()) => {
                        outcome.findings.push(
                            Finding::new(
                                FindingCode::ExistingDivergence,
                                vec![field],
                                format!(
                                    "{} differs: stored '{old}', extracted '{new}'; stored value kept",
                                    field.label()
                                ),
                            )
                            .with_values(old.clone(), new),
                        );
                        outcome.merged = Some(old);
                    }
                    _ => {
                        outcome.merged = Some(new);
                        outcome.adopted = true;
                    }
                }
            }
            (None, Some(old)) => {
                if field.is_required() {
                    outcome.findings.push(Finding::new(
                        FindingCode::RetainedPrior,
                        vec![field],
                        format!(
                            "{} not found in new extraction, prior value '{old}' retained",
                            field.label()
                        ),
                    ));
                }
                outcome.merged = Some(old);
            }
            (None, None) => {
                if field.is_required() {
                    outcome.findings.push(Finding::new(
                        FindingCode::RequiredMissing,
                        vec![field],
                        format!("missing required field: {}", field.label()),
                    ));
                }
            }
        }

        outcome
    }
}

/// Every entry must sit under its own field, carry a non-empty value of the
/// field's type, and belong to the same record.
fn check_confirmed(confirmed: &ConfirmedFields) -> Result<(), ReconcileError> {
    let mut record_id: Option<&str> = None;

    for (field, entry) in confirmed {
        let mismatch = |reason: String| ReconcileError::ConfirmedFieldMismatch {
            field: *field,
            reason,
        };

        if entry.field != *field {
            return Err(mismatch(format!("entry names field '{}'", entry.field)));
        }
        if !entry.value.fits(field.kind()) || entry.value.is_empty() {
            return Err(mismatch(format!(
                "value '{}' is not a valid {}",
                entry.value,
                field.label()
            )));
        }
        match record_id {
            Some(id) if id != entry.record_id => {
                return Err(mismatch(format!(
                    "entry belongs to record '{}', expected '{id}'",
                    entry.record_id
                )));
            }
            _ => record_id = Some(entry.record_id.as_str()),
        }
    }

    Ok(())
}
