use std::path::PathBuf;

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};

use policy_recon::error::StoreError;
use policy_recon::ingest::load_csv_candidates;
use policy_recon::model::ConfirmedField;
use policy_recon::normalize::normalize_money;
use policy_recon::{
    reconcile, reconcile_candidate, ConfirmationRegistry, ConfirmedFields, FieldValue,
    FindingCode, InMemoryRegistry, InMemoryStore, LogicalField, Money, PolicyRecord,
    ReconcileConfig, ReconcileService, RecordStore, ServiceError, SourceReliability,
    StoredRecord,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn money(units: i64) -> Option<Money> {
    Some(Money::from_cents(units * 100))
}

/// A complete stored policy.
fn stored_policy() -> PolicyRecord {
    PolicyRecord {
        insurer: Some("ACME SEGUROS".into()),
        policy_number: Some("12345-X".into()),
        insured_name: Some("Maria Da Silva".into()),
        premium: money(1200),
        monthly_amount: money(100),
        start_date: date("2024-01-01"),
        end_date: date("2025-01-01"),
        deductible: None,
    }
}

/// A complete upload in the nested historical layout.
fn full_upload() -> Value {
    json!({
        "informacoes_gerais": {
            "numero_apolice": "12345-X",
            "segurado": "maria da silva"
        },
        "seguradora": "Acme Seguros",
        "valores": { "premio": "R$ 1.200,00", "custo_mensal": "R$ 100,00" },
        "vigencia": { "inicio": "01/01/2024", "fim": "01/01/2025" }
    })
}

fn confirmation(field: LogicalField, value: FieldValue) -> ConfirmedFields {
    let mut map = ConfirmedFields::new();
    map.insert(
        field,
        ConfirmedField {
            record_id: "pol-1".into(),
            field,
            value,
            confirmed_at: Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap(),
            confirmed_by: "ana".into(),
        },
    );
    map
}

fn run(raw: &Value, existing: Option<&PolicyRecord>, confirmed: &ConfirmedFields) -> policy_recon::ValidationResult {
    reconcile(raw, existing, confirmed, &ReconcileConfig::default()).unwrap()
}

// -------------------------------------------------------------------------
// Engine scenarios
// -------------------------------------------------------------------------

#[test]
fn first_upload_creates_clean_record() {
    let result = run(&full_upload(), None, &ConfirmedFields::new());

    assert!(result.is_valid);
    assert!(result.errors.is_empty());
    assert!(result.warnings.is_empty());
    assert!(result.pending_review.is_empty());
    assert_eq!(result.normalized_data, stored_policy());
    assert_eq!(result.metadata.extraction_quality, 100);
    assert_eq!(result.metadata.source_reliability, SourceReliability::High);
    assert_eq!(result.metadata.fields_missing, vec![LogicalField::Deductible]);
    assert!(result
        .metadata
        .fields_normalized
        .contains(&LogicalField::StartDate));
}

#[test]
fn monetary_normalization() {
    assert_eq!(
        normalize_money(&json!("R$ 1.234,56"), false),
        Some(Money::from_cents(123456))
    );
    assert_eq!(normalize_money(&json!(1234.5), false).unwrap().as_f64(), 1234.5);
}

#[test]
fn date_order_is_blocking() {
    let raw = json!({ "startDate": "2024-06-01", "endDate": "2024-01-01" });
    let result = run(&raw, Some(&PolicyRecord::default()), &ConfirmedFields::new());

    assert!(!result.is_valid);
    assert!(result
        .errors
        .iter()
        .any(|f| f.code == FindingCode::InvalidDateOrder));
}

#[test]
fn conflicting_insurer_keeps_stored_value() {
    let raw = json!({ "seguradora": "OUTRA CIA" });
    let existing = PolicyRecord {
        insurer: Some("ACME SEGUROS".into()),
        ..Default::default()
    };
    let result = run(&raw, Some(&existing), &ConfirmedFields::new());

    assert_eq!(result.normalized_data.insurer.as_deref(), Some("ACME SEGUROS"));
    let reviews: Vec<_> = result.reviews_for(LogicalField::Insurer).collect();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].code, FindingCode::ExistingDivergence);
    assert_eq!(reviews[0].incoming, Some(FieldValue::Text("OUTRA CIA".into())));
    // The divergence itself never blocks
    assert!(result.errors.iter().all(|f| !f.concerns(LogicalField::Insurer)));
}

#[test]
fn conflicting_insurer_on_complete_record_is_valid() {
    let mut raw = full_upload();
    raw["seguradora"] = json!("OUTRA CIA");
    let result = run(&raw, Some(&stored_policy()), &ConfirmedFields::new());

    assert!(result.is_valid);
    assert_eq!(result.normalized_data, stored_policy());
    assert!(result.has(FindingCode::ExistingDivergence));
    assert_eq!(result.metadata.extraction_quality, 85);
}

#[test]
fn confirmed_policy_number_wins() {
    let existing = stored_policy();
    let confirmed = confirmation(LogicalField::PolicyNumber, FieldValue::Text("12345-X".into()));
    let mut raw = full_upload();
    raw["informacoes_gerais"]["numero_apolice"] = json!("99999-Z");

    let result = run(&raw, Some(&existing), &confirmed);

    assert!(result.is_valid);
    assert_eq!(result.normalized_data.policy_number.as_deref(), Some("12345-X"));
    let reviews: Vec<_> = result.reviews_for(LogicalField::PolicyNumber).collect();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].code, FindingCode::ConfirmedDivergence);
    assert!(result.metadata.extraction_quality < 100);
}

#[test]
fn confirmed_value_beats_stored_value() {
    let existing = stored_policy();
    let confirmed = confirmation(LogicalField::Insurer, FieldValue::Text("ACME SEGUROS S.A.".into()));
    let result = run(&full_upload(), Some(&existing), &confirmed);

    assert_eq!(
        result.normalized_data.insurer.as_deref(),
        Some("ACME SEGUROS S.A.")
    );
}

#[test]
fn monthly_amount_tolerance() {
    let exact = json!({ "premium": 1200, "monthlyAmount": 100 });
    let result = run(&exact, None, &ConfirmedFields::new());
    assert!(!result.has(FindingCode::FinancialInconsistency));

    let off = json!({ "premium": 1200, "monthlyAmount": 70 });
    let result = run(&off, None, &ConfirmedFields::new());
    assert!(result
        .pending_review
        .iter()
        .any(|f| f.code == FindingCode::FinancialInconsistency));
}

#[test]
fn missing_from_new_extraction_retains_prior() {
    let raw = json!({ "seguradora": "Acme Seguros" });
    let result = run(&raw, Some(&stored_policy()), &ConfirmedFields::new());

    assert!(result.is_valid);
    assert_eq!(result.normalized_data, stored_policy());
    // Five required fields retained; the optional monthly amount is silent
    let retained: Vec<_> = result
        .pending_review
        .iter()
        .filter(|f| f.code == FindingCode::RetainedPrior)
        .collect();
    assert_eq!(retained.len(), 5);
    assert_eq!(result.metadata.extraction_quality, 75);
    assert_eq!(result.metadata.source_reliability, SourceReliability::Medium);
}

#[test]
fn unparsable_values_count_as_not_found() {
    let raw = json!({ "premio": "a combinar", "inicio_vigencia": "em breve" });
    let result = run(&raw, Some(&stored_policy()), &ConfirmedFields::new());

    assert_eq!(result.normalized_data.premium, money(1200));
    assert_eq!(result.normalized_data.start_date, date("2024-01-01"));
    assert!(result.metadata.fields_missing.contains(&LogicalField::Premium));
    assert!(!result.has(FindingCode::ExistingDivergence));
}

#[test]
fn installment_text_is_not_an_amount() {
    let raw = json!({ "premio": "12x de R$ 100,00", "custo_mensal": "2 parcelas de 150,00" });
    let result = run(&raw, Some(&stored_policy()), &ConfirmedFields::new());

    assert_eq!(result.normalized_data.premium, money(1200));
    assert_eq!(result.normalized_data.monthly_amount, money(100));
    assert!(result.metadata.fields_missing.contains(&LogicalField::Premium));
    assert!(result.metadata.fields_missing.contains(&LogicalField::MonthlyAmount));
    assert!(!result.has(FindingCode::ExistingDivergence));
}

#[test]
fn policy_number_case_change_is_flagged() {
    let existing = PolicyRecord {
        policy_number: Some("12345-x".into()),
        ..Default::default()
    };
    let raw = json!({ "numero_apolice": "12345-X" });
    let result = run(&raw, Some(&existing), &ConfirmedFields::new());

    assert_eq!(result.normalized_data.policy_number.as_deref(), Some("12345-x"));
    let reviews: Vec<_> = result.reviews_for(LogicalField::PolicyNumber).collect();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].code, FindingCode::ExistingDivergence);
}

#[test]
fn warnings_do_not_block() {
    let mut raw = full_upload();
    raw["vigencia"]["fim"] = json!("01/01/2027");
    raw["franquia"] = json!("R$ 5.000,00");
    let result = run(&raw, None, &ConfirmedFields::new());

    assert!(result.is_valid);
    let codes: Vec<_> = result.warnings.iter().map(|f| f.code).collect();
    assert_eq!(
        codes,
        vec![
            FindingCode::LongCoveragePeriod,
            FindingCode::DeductibleExceedsPremium
        ]
    );
}

#[test]
fn result_serializes_for_the_ui() {
    let result = run(&json!({ "seguradora": "OUTRA CIA" }), Some(&stored_policy()), &ConfirmedFields::new());
    let value = serde_json::to_value(&result).unwrap();

    assert_eq!(value["isValid"], json!(true));
    assert_eq!(value["normalizedData"]["policyNumber"], json!("12345-X"));
    assert_eq!(value["normalizedData"]["premium"], json!(1200.0));
    assert_eq!(value["pendingReview"][0]["code"], json!("existing_divergence"));
    assert_eq!(value["pendingReview"][0]["fields"], json!(["insurer"]));
    assert_eq!(value["metadata"]["sourceReliability"], json!("medium"));
    assert_eq!(value["metadata"]["extractionQuality"], json!(60));
    assert!(value.get("is_valid").is_none());
    assert!(value.get("pending_review").is_none());
}

// -------------------------------------------------------------------------
// Config
// -------------------------------------------------------------------------

#[test]
fn strict_config_from_fixture() {
    let config = ReconcileConfig::from_path(&fixtures_dir().join("strict.recon.toml")).unwrap();
    assert_eq!(config.tolerance.monthly_deviation, 0.05);

    // 115/month is within 20% but not within 5%
    let raw = json!({ "dados": { "cia": "ACME", "valor_anual": 1200 }, "monthlyAmount": 115 });
    let result = reconcile(&raw, None, &ConfirmedFields::new(), &config).unwrap();
    assert_eq!(result.normalized_data.insurer.as_deref(), Some("ACME"));
    assert_eq!(result.normalized_data.premium, money(1200));
    assert!(result.has(FindingCode::FinancialInconsistency));
}

#[test]
fn config_from_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recon.toml");
    std::fs::write(&path, "[tiers]\nhigh = 95\nmedium = 50\n").unwrap();
    let config = ReconcileConfig::from_path(&path).unwrap();

    let result = reconcile(&full_upload(), Some(&stored_policy()), &ConfirmedFields::new(), &config).unwrap();
    assert_eq!(result.metadata.source_reliability, SourceReliability::High);

    let missing = ReconcileConfig::from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(missing.to_string().starts_with("IO error"));
}

// -------------------------------------------------------------------------
// CSV import
// -------------------------------------------------------------------------

#[test]
fn csv_sheet_reconciles_row_by_row() {
    let sheet = std::fs::read_to_string(fixtures_dir().join("apolices.csv")).unwrap();
    let rows = load_csv_candidates(&sheet, "id").unwrap();
    assert_eq!(rows.len(), 3);

    let config = ReconcileConfig::default();
    let results: Vec<_> = rows
        .iter()
        .map(|(id, candidate)| {
            let r = reconcile_candidate(candidate, None, &ConfirmedFields::new(), &config).unwrap();
            (id.as_str(), r)
        })
        .collect();

    let (_, first) = &results[0];
    assert!(first.is_valid);
    assert!(first.pending_review.is_empty());
    assert_eq!(first.normalized_data.insured_name.as_deref(), Some("Maria Da Silva"));
    assert_eq!(first.normalized_data.deductible, money(500));

    let (_, second) = &results[1];
    assert!(second.is_valid);
    assert!(second.has(FindingCode::FinancialInconsistency));

    let (id, third) = &results[2];
    assert_eq!(*id, "pol-102");
    assert!(!third.is_valid);
    assert!(third.has(FindingCode::InvalidDateOrder));
}

// -------------------------------------------------------------------------
// Service
// -------------------------------------------------------------------------

fn service() -> ReconcileService<InMemoryStore, InMemoryRegistry> {
    ReconcileService::new(
        InMemoryStore::new(),
        InMemoryRegistry::new(),
        ReconcileConfig::default(),
    )
}

#[test]
fn service_creates_then_noops() {
    let svc = service();

    let first = svc.reconcile_and_store("pol-1", &full_upload()).unwrap();
    assert!(first.persisted);
    assert_eq!(first.revision, Some(1));

    let again = svc.reconcile_and_store("pol-1", &full_upload()).unwrap();
    assert!(!again.persisted);
    assert_eq!(again.revision, Some(1));
    assert_eq!(again.result, first.result);
}

#[test]
fn service_does_not_persist_blocking_errors() {
    let svc = service();
    let outcome = svc
        .reconcile_and_store("pol-1", &json!({ "seguradora": "ACME" }))
        .unwrap();
    assert!(!outcome.persisted);
    assert_eq!(outcome.revision, None);
    assert!(svc.store().get("pol-1").unwrap().is_none());
}

#[test]
fn service_confirmation_protects_field() {
    let svc = service();
    svc.reconcile_and_store("pol-1", &full_upload()).unwrap();
    svc.confirm_field("pol-1", LogicalField::PolicyNumber, "ana").unwrap();

    let mut changed = full_upload();
    changed["informacoes_gerais"]["numero_apolice"] = json!("99999-Z");
    let outcome = svc.reconcile_and_store("pol-1", &changed).unwrap();

    assert!(!outcome.persisted);
    assert_eq!(outcome.result.normalized_data.policy_number.as_deref(), Some("12345-X"));
    assert!(outcome.result.has(FindingCode::ConfirmedDivergence));

    let dup = svc
        .confirm_field("pol-1", LogicalField::PolicyNumber, "bia")
        .unwrap_err();
    match dup {
        ServiceError::Registry(e) => assert!(e.is_recoverable()),
        other => panic!("expected registry error, got {other:?}"),
    }

    svc.unconfirm_field("pol-1", LogicalField::PolicyNumber).unwrap();
    assert!(svc.registry().list_confirmed("pol-1").unwrap().is_empty());
}

#[test]
fn service_rejects_mistyped_confirmation_up_front() {
    let svc = service();
    svc.reconcile_and_store("pol-1", &full_upload()).unwrap();

    let err = svc
        .registry()
        .confirm(
            "pol-1",
            LogicalField::Premium,
            FieldValue::Text("mil reais".into()),
            "ana",
        )
        .unwrap_err();
    assert!(!err.is_recoverable());
    assert!(svc.registry().list_confirmed("pol-1").unwrap().is_empty());

    // The record stays reconcilable
    let outcome = svc.reconcile_and_store("pol-1", &full_upload()).unwrap();
    assert!(outcome.result.is_valid);
}

#[test]
fn service_rejects_confirming_empty_field() {
    let svc = service();
    svc.reconcile_and_store("pol-1", &full_upload()).unwrap();
    let err = svc
        .confirm_field("pol-1", LogicalField::Deductible, "ana")
        .unwrap_err();
    assert_eq!(
        err,
        ServiceError::NothingToConfirm {
            record_id: "pol-1".into(),
            field: LogicalField::Deductible
        }
    );
}

#[test]
fn service_rejects_non_object_candidate() {
    let svc = service();
    let err = svc.reconcile_and_store("pol-1", &json!([1, 2, 3])).unwrap_err();
    assert!(matches!(err, ServiceError::Reconcile(_)));
}

/// Store that lets a competing writer land just before the first N writes.
struct RacingStore {
    inner: InMemoryStore,
    races: std::sync::atomic::AtomicU32,
}

impl RecordStore for RacingStore {
    fn get(&self, record_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        self.inner.get(record_id)
    }

    fn compare_and_swap(
        &self,
        record_id: &str,
        expected: Option<u64>,
        record: PolicyRecord,
    ) -> Result<u64, StoreError> {
        use std::sync::atomic::Ordering;
        if self.races.load(Ordering::SeqCst) > 0 {
            self.races.fetch_sub(1, Ordering::SeqCst);
            let competing = PolicyRecord {
                monthly_amount: None,
                deductible: money(300),
                ..stored_policy()
            };
            let current = self.inner.get(record_id)?.map(|s| s.revision);
            self.inner.compare_and_swap(record_id, current, competing)?;
        }
        self.inner.compare_and_swap(record_id, expected, record)
    }
}

#[test]
fn service_rereads_after_revision_conflict() {
    let store = RacingStore {
        inner: InMemoryStore::new(),
        races: std::sync::atomic::AtomicU32::new(1),
    };
    let svc = ReconcileService::new(store, InMemoryRegistry::new(), ReconcileConfig::default());

    let outcome = svc.reconcile_and_store("pol-1", &full_upload()).unwrap();

    // Second round merged on top of the competing write
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.persisted);
    assert_eq!(outcome.revision, Some(2));
    let stored = svc.store().get("pol-1").unwrap().unwrap();
    assert_eq!(stored.record.deductible, money(300));
    assert_eq!(stored.record.monthly_amount, money(100));
}

#[test]
fn service_gives_up_after_max_retries() {
    let store = RacingStore {
        inner: InMemoryStore::new(),
        races: std::sync::atomic::AtomicU32::new(u32::MAX),
    };
    let svc = ReconcileService::new(store, InMemoryRegistry::new(), ReconcileConfig::default());

    let err = svc.reconcile_and_store("pol-1", &full_upload()).unwrap_err();
    assert_eq!(
        err,
        ServiceError::RetriesExhausted {
            record_id: "pol-1".into(),
            attempts: 3
        }
    );
}
