use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ReconcileError;
use crate::model::LogicalField;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Heuristic constants of a reconciliation pass. Every section is optional;
/// omitted values fall back to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(default)]
    pub penalties: PenaltyConfig,
    #[serde(default)]
    pub tiers: TierConfig,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub aliases: AliasConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

// ---------------------------------------------------------------------------
// Tolerance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    /// Allowed relative deviation of the monthly amount from premium / 12.
    pub monthly_deviation: f64,
    /// Coverage spans longer than this are flagged as unusual.
    pub max_coverage_months: u32,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            monthly_deviation: 0.20,
            max_coverage_months: 24,
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Points deducted from 100 per occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PenaltyConfig {
    pub required_missing: u32,
    pub validation_failure: u32,
    pub divergence: u32,
    pub retained_prior: u32,
    pub cross_field_error: u32,
    pub cross_field_warning: u32,
    pub cross_field_review: u32,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            required_missing: 20,
            validation_failure: 10,
            divergence: 15,
            retained_prior: 5,
            cross_field_error: 20,
            cross_field_warning: 10,
            cross_field_review: 15,
        }
    }
}

/// Lower bounds (inclusive) of the `high` and `medium` reliability tiers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub high: u8,
    pub medium: u8,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self { high: 80, medium: 60 }
    }
}

// ---------------------------------------------------------------------------
// Normalization + validation limits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub min_name_len: usize,
    pub min_policy_number_len: usize,
    /// Largest plausible monetary value, in currency units.
    pub max_amount: f64,
    pub min_year: i32,
    pub max_year: i32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_name_len: 3,
            min_policy_number_len: 5,
            max_amount: 10_000_000.0,
            min_year: 1900,
            max_year: 2100,
        }
    }
}

// ---------------------------------------------------------------------------
// Aliases
// ---------------------------------------------------------------------------

/// Source keys appended after the built-in alias table.
///
/// ```toml
/// [aliases]
/// insurer = ["cia"]
/// groups = ["dados"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AliasConfig {
    /// Extra nesting groups searched after the built-in ones.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Extra keys per logical field name.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Vec<String>>,
}

impl AliasConfig {
    /// Extra keys configured for `field`, in declaration order.
    pub fn extra_for(&self, field: LogicalField) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(name, _)| LogicalField::from_name(name) == Some(field))
            .flat_map(|(_, keys)| keys.iter().map(String::as_str))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Read-reconcile-write attempts before giving up on a contended record.
    pub max_cas_retries: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { max_cas_retries: 3 }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconcileConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconcileError> {
        let config: ReconcileConfig =
            toml::from_str(input).map_err(|e| ReconcileError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ReconcileError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| ReconcileError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    pub fn validate(&self) -> Result<(), ReconcileError> {
        let deviation = self.tolerance.monthly_deviation;
        if !(0.0..=1.0).contains(&deviation) {
            return Err(ReconcileError::ConfigValidation(format!(
                "tolerance.monthly_deviation must be within 0..=1, got {deviation}"
            )));
        }

        if self.tolerance.max_coverage_months == 0 {
            return Err(ReconcileError::ConfigValidation(
                "tolerance.max_coverage_months must be positive".into(),
            ));
        }

        if self.tiers.high > 100 || self.tiers.high <= self.tiers.medium {
            return Err(ReconcileError::ConfigValidation(format!(
                "tiers must satisfy medium < high <= 100, got medium={} high={}",
                self.tiers.medium, self.tiers.high
            )));
        }

        if self.limits.min_name_len == 0 || self.limits.min_policy_number_len == 0 {
            return Err(ReconcileError::ConfigValidation(
                "limits: minimum lengths must be positive".into(),
            ));
        }

        if self.limits.max_amount.is_nan() || self.limits.max_amount <= 0.0 {
            return Err(ReconcileError::ConfigValidation(format!(
                "limits.max_amount must be positive, got {}",
                self.limits.max_amount
            )));
        }

        if self.limits.min_year >= self.limits.max_year {
            return Err(ReconcileError::ConfigValidation(format!(
                "limits: min_year ({}) must be before max_year ({})",
                self.limits.min_year, self.limits.max_year
            )));
        }

        if self.service.max_cas_retries == 0 {
            return Err(ReconcileError::ConfigValidation(
                "service.max_cas_retries must be at least 1".into(),
            ));
        }

        for name in self.aliases.fields.keys() {
            if LogicalField::from_name(name).is_none() {
                return Err(ReconcileError::ConfigValidation(format!(
                    "aliases: unknown field '{name}'"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
