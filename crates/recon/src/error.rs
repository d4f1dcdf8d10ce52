use std::fmt;

use crate::model::LogicalField;

/// Caller contract violations and configuration problems.
///
/// Data-quality issues in a candidate never surface here; they degrade to
/// "field not found" and are reported through `ValidationResult`.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad tolerance, tier ordering, unknown alias field, etc.).
    ConfigValidation(String),
    /// IO error (config file read, CSV decode, etc.).
    Io(String),
    /// Missing required column in an import sheet.
    MissingColumn { column: String },
    /// Candidate text is not valid JSON.
    InvalidJson(String),
    /// Candidate is valid JSON but not an object.
    NotAnObject { found: &'static str },
    /// A confirmation entry is inconsistent with the field it is registered under.
    ConfirmedFieldMismatch { field: LogicalField, reason: String },
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::MissingColumn { column } => write!(f, "missing column '{column}'"),
            Self::InvalidJson(msg) => write!(f, "candidate is not valid JSON: {msg}"),
            Self::NotAnObject { found } => {
                write!(f, "candidate must be a JSON object, found {found}")
            }
            Self::ConfirmedFieldMismatch { field, reason } => {
                write!(f, "confirmed field '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for ReconcileError {}

/// Failures of the confirmation collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// `(record_id, field)` is already confirmed. Recoverable: show "already confirmed".
    AlreadyConfirmed { record_id: String, field: LogicalField },
    /// Only non-empty values can be confirmed.
    EmptyValue { record_id: String, field: LogicalField },
    /// The value's type cannot be stored under the field (e.g. text for a premium).
    TypeMismatch { record_id: String, field: LogicalField },
    /// Backing store failure.
    Backend(String),
}

impl RegistryError {
    /// True for conditions the caller should report instead of failing the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AlreadyConfirmed { .. })
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyConfirmed { record_id, field } => {
                write!(f, "record '{record_id}': field '{field}' is already confirmed")
            }
            Self::EmptyValue { record_id, field } => {
                write!(f, "record '{record_id}': cannot confirm empty field '{field}'")
            }
            Self::TypeMismatch { record_id, field } => write!(
                f,
                "record '{record_id}': value is not a valid {} for field '{field}'",
                field.label()
            ),
            Self::Backend(msg) => write!(f, "confirmation backend error: {msg}"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Failures of the revisioned record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The stored revision moved between read and write.
    RevisionConflict {
        record_id: String,
        expected: Option<u64>,
        actual: Option<u64>,
    },
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RevisionConflict { record_id, expected, actual } => write!(
                f,
                "record '{record_id}': revision conflict (expected {}, found {})",
                fmt_revision(*expected),
                fmt_revision(*actual)
            ),
            Self::Backend(msg) => write!(f, "record store error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

fn fmt_revision(rev: Option<u64>) -> String {
    match rev {
        Some(r) => r.to_string(),
        None => "none".to_string(),
    }
}

/// Errors surfaced by `ReconcileService`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    Reconcile(ReconcileError),
    Registry(RegistryError),
    Store(StoreError),
    /// Concurrent writers kept moving the revision.
    RetriesExhausted { record_id: String, attempts: u32 },
    /// The stored record has no value for the field a human tried to confirm.
    NothingToConfirm { record_id: String, field: LogicalField },
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconcile(e) => write!(f, "{e}"),
            Self::Registry(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
            Self::RetriesExhausted { record_id, attempts } => write!(
                f,
                "record '{record_id}': gave up after {attempts} conflicting write attempt(s)"
            ),
            Self::NothingToConfirm { record_id, field } => {
                write!(f, "record '{record_id}': field '{field}' has no stored value to confirm")
            }
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Reconcile(e) => Some(e),
            Self::Registry(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ReconcileError> for ServiceError {
    fn from(e: ReconcileError) -> Self {
        Self::Reconcile(e)
    }
}

impl From<RegistryError> for ServiceError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
