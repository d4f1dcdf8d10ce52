use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Logical fields
// ---------------------------------------------------------------------------

/// One of the fixed semantic attributes of a policy record, independent of
/// the key a particular source uses for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogicalField {
    Insurer,
    PolicyNumber,
    InsuredName,
    Premium,
    MonthlyAmount,
    StartDate,
    EndDate,
    Deductible,
}

/// Semantic type of a logical field; selects the normalizer and validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Identifier-like text, stored upper-cased.
    Text,
    PersonName,
    PolicyNumber,
    Money { allow_zero: bool },
    Date,
}

impl LogicalField {
    /// Reconciliation order.
    pub const ALL: [LogicalField; 8] = [
        Self::Insurer,
        Self::PolicyNumber,
        Self::InsuredName,
        Self::Premium,
        Self::MonthlyAmount,
        Self::StartDate,
        Self::EndDate,
        Self::Deductible,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Insurer => "insurer",
            Self::PolicyNumber => "policyNumber",
            Self::InsuredName => "insuredName",
            Self::Premium => "premium",
            Self::MonthlyAmount => "monthlyAmount",
            Self::StartDate => "startDate",
            Self::EndDate => "endDate",
            Self::Deductible => "deductible",
        }
    }

    /// Human-readable label used in finding messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Insurer => "insurer",
            Self::PolicyNumber => "policy number",
            Self::InsuredName => "insured name",
            Self::Premium => "premium",
            Self::MonthlyAmount => "monthly amount",
            Self::StartDate => "start date",
            Self::EndDate => "end date",
            Self::Deductible => "deductible",
        }
    }

    /// Accepts the camelCase name or its snake_case spelling.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| {
            f.name() == name || f.label().replace(' ', "_") == name
        })
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Insurer => FieldKind::Text,
            Self::PolicyNumber => FieldKind::PolicyNumber,
            Self::InsuredName => FieldKind::PersonName,
            Self::Premium | Self::MonthlyAmount => FieldKind::Money { allow_zero: false },
            Self::Deductible => FieldKind::Money { allow_zero: true },
            Self::StartDate | Self::EndDate => FieldKind::Date,
        }
    }

    /// Required fields may not end a reconciliation pass empty.
    pub fn is_required(&self) -> bool {
        !matches!(self, Self::MonthlyAmount | Self::Deductible)
    }
}

impl fmt::Display for LogicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Monetary amount in integer cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Rounds half away from zero to whole cents. Rejects non-finite and
    /// out-of-range input.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let cents = (value * 100.0).round();
        if cents.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Self(cents as i64))
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        let parsed = match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Money::from_f64(n),
            Repr::Text(s) => crate::normalize::parse_amount(&s).and_then(Money::from_f64),
        };
        parsed.ok_or_else(|| serde::de::Error::custom("invalid monetary amount"))
    }
}

/// A normalized value for one logical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Money(Money),
    Date(NaiveDate),
}

impl FieldValue {
    /// Whether this value can be stored under a field of `kind`.
    pub fn fits(&self, kind: FieldKind) -> bool {
        match (self, kind) {
            (Self::Text(_), FieldKind::Text | FieldKind::PersonName | FieldKind::PolicyNumber) => {
                true
            }
            (Self::Money(_), FieldKind::Money { .. }) => true,
            (Self::Date(_), FieldKind::Date) => true,
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }

    /// Whether two values of a field of `kind` mean the same thing.
    ///
    /// Policy numbers keep their case, so they only ignore surrounding
    /// whitespace. Other text compares after whitespace collapse and
    /// upper-casing; money and dates compare exactly.
    pub fn agrees_with(&self, other: &FieldValue, kind: FieldKind) -> bool {
        match (self, other, kind) {
            (Self::Text(a), Self::Text(b), FieldKind::PolicyNumber) => a.trim() == b.trim(),
            (Self::Text(a), Self::Text(b), _) => fold_text(a) == fold_text(b),
            _ => self == other,
        }
    }
}

fn fold_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Money(m) => write!(f, "{m}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// The authoritative policy entity. Every attribute is optional so that the
/// same type carries partial stored state and merged output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insured_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deductible: Option<Money>,
}

impl PolicyRecord {
    /// Value of `field`, with empty text treated as absent.
    pub fn get(&self, field: LogicalField) -> Option<FieldValue> {
        let value = match field {
            LogicalField::Insurer => self.insurer.clone().map(FieldValue::Text),
            LogicalField::PolicyNumber => self.policy_number.clone().map(FieldValue::Text),
            LogicalField::InsuredName => self.insured_name.clone().map(FieldValue::Text),
            LogicalField::Premium => self.premium.map(FieldValue::Money),
            LogicalField::MonthlyAmount => self.monthly_amount.map(FieldValue::Money),
            LogicalField::StartDate => self.start_date.map(FieldValue::Date),
            LogicalField::EndDate => self.end_date.map(FieldValue::Date),
            LogicalField::Deductible => self.deductible.map(FieldValue::Money),
        };
        value.filter(|v| !v.is_empty())
    }

    /// Stores `value` under `field`. Returns false (and leaves the record
    /// untouched) when the value's type does not fit the field.
    pub fn set(&mut self, field: LogicalField, value: FieldValue) -> bool {
        match (field, value) {
            (LogicalField::Insurer, FieldValue::Text(s)) => self.insurer = Some(s),
            (LogicalField::PolicyNumber, FieldValue::Text(s)) => self.policy_number = Some(s),
            (LogicalField::InsuredName, FieldValue::Text(s)) => self.insured_name = Some(s),
            (LogicalField::Premium, FieldValue::Money(m)) => self.premium = Some(m),
            (LogicalField::MonthlyAmount, FieldValue::Money(m)) => self.monthly_amount = Some(m),
            (LogicalField::StartDate, FieldValue::Date(d)) => self.start_date = Some(d),
            (LogicalField::EndDate, FieldValue::Date(d)) => self.end_date = Some(d),
            (LogicalField::Deductible, FieldValue::Money(m)) => self.deductible = Some(m),
            _ => return false,
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        LogicalField::ALL.iter().all(|f| self.get(*f).is_none())
    }
}

/// A field value a human has locked against automated overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedField {
    pub record_id: String,
    pub field: LogicalField,
    pub value: FieldValue,
    pub confirmed_at: DateTime<Utc>,
    pub confirmed_by: String,
}

/// Confirmation state of one record, keyed by field.
pub type ConfirmedFields = BTreeMap<LogicalField, ConfirmedField>;

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocks acceptance.
    Error,
    Warning,
    /// Needs a human before the automated value is trusted.
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCode {
    RequiredMissing,
    InvalidDateOrder,
    ValidationFailed,
    LongCoveragePeriod,
    DeductibleExceedsPremium,
    ConfirmedDivergence,
    ExistingDivergence,
    RetainedPrior,
    FinancialInconsistency,
}

impl FindingCode {
    pub fn severity(&self) -> Severity {
        match self {
            Self::RequiredMissing | Self::InvalidDateOrder => Severity::Error,
            Self::ValidationFailed | Self::LongCoveragePeriod | Self::DeductibleExceedsPremium => {
                Severity::Warning
            }
            Self::ConfirmedDivergence
            | Self::ExistingDivergence
            | Self::RetainedPrior
            | Self::FinancialInconsistency => Severity::Review,
        }
    }
}

impl fmt::Display for FindingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequiredMissing => write!(f, "required_missing"),
            Self::InvalidDateOrder => write!(f, "invalid_date_order"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::LongCoveragePeriod => write!(f, "long_coverage_period"),
            Self::DeductibleExceedsPremium => write!(f, "deductible_exceeds_premium"),
            Self::ConfirmedDivergence => write!(f, "confirmed_divergence"),
            Self::ExistingDivergence => write!(f, "existing_divergence"),
            Self::RetainedPrior => write!(f, "retained_prior"),
            Self::FinancialInconsistency => write!(f, "financial_inconsistency"),
        }
    }
}

/// One error, warning or review item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub code: FindingCode,
    pub fields: Vec<LogicalField>,
    pub message: String,
    /// Value kept in the merged record (divergences only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retained: Option<FieldValue>,
    /// Incoming value that was not adopted (divergences only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incoming: Option<FieldValue>,
}

impl Finding {
    pub fn new(code: FindingCode, fields: Vec<LogicalField>, message: impl Into<String>) -> Self {
        Self {
            code,
            fields,
            message: message.into(),
            retained: None,
            incoming: None,
        }
    }

    pub fn with_values(mut self, retained: FieldValue, incoming: FieldValue) -> Self {
        self.retained = Some(retained);
        self.incoming = Some(incoming);
        self
    }

    pub fn concerns(&self, field: LogicalField) -> bool {
        self.fields.contains(&field)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Coarse trust tier derived from the extraction quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceReliability {
    Low,
    Medium,
    High,
}

impl fmt::Display for SourceReliability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub source_reliability: SourceReliability,
    /// 0–100.
    pub extraction_quality: u8,
    /// Fields the new extraction produced a usable value for.
    pub fields_found: Vec<LogicalField>,
    /// Fields the new extraction produced nothing usable for.
    pub fields_missing: Vec<LogicalField>,
    /// Adopted fields whose canonical form differs from the raw input.
    pub fields_normalized: Vec<LogicalField>,
}

/// Outcome of one reconciliation pass. Not persisted.
/// Serialized with camelCase keys, like the `PolicyRecord` it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub pending_review: Vec<Finding>,
    pub normalized_data: PolicyRecord,
    pub metadata: ResultMetadata,
}

impl ValidationResult {
    /// Review items concerning `field`.
    pub fn reviews_for(&self, field: LogicalField) -> impl Iterator<Item = &Finding> {
        self.pending_review.iter().filter(move |f| f.concerns(field))
    }

    /// Whether any error, warning or review item carries `code`.
    pub fn has(&self, code: FindingCode) -> bool {
        self.errors
            .iter()
            .chain(&self.warnings)
            .chain(&self.pending_review)
            .any(|f| f.code == code)
    }
}
