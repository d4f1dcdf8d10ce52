//! `policy-recon`: policy-data reconciliation engine.
//!
//! Pure engine: receives a raw candidate, the stored record and its
//! confirmed fields, returns the merged record plus a structured report.
//! No IO inside the engine; `store`, `registry` and `service` describe and
//! drive the caller side.

pub mod config;
pub mod cross;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod model;
pub mod normalize;
pub mod registry;
pub mod score;
pub mod service;
pub mod store;
pub mod validate;

pub use config::ReconcileConfig;
pub use engine::{reconcile, reconcile_candidate, Reconciler};
pub use error::{ReconcileError, RegistryError, ServiceError, StoreError};
pub use extract::{FieldExtractor, RawCandidate};
pub use model::{
    ConfirmedField, ConfirmedFields, FieldValue, Finding, FindingCode, LogicalField, Money,
    PolicyRecord, SourceReliability, ValidationResult,
};
pub use registry::{ConfirmationRegistry, InMemoryRegistry};
pub use service::{ReconcileOutcome, ReconcileService};
pub use store::{InMemoryStore, RecordStore, StoredRecord};
