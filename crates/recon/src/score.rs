use crate::config::{PenaltyConfig, TierConfig};
use crate::model::{Finding, FindingCode, SourceReliability};

/// Occurrence counts of each penalized finding kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PenaltyTally {
    pub required_missing: u32,
    pub validation_failures: u32,
    pub divergences: u32,
    pub retained_prior: u32,
    pub cross_field_errors: u32,
    pub cross_field_warnings: u32,
    pub cross_field_reviews: u32,
}

impl PenaltyTally {
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let mut tally = Self::default();
        for finding in findings {
            match finding.code {
                FindingCode::RequiredMissing => tally.required_missing += 1,
                FindingCode::ValidationFailed => tally.validation_failures += 1,
                FindingCode::ConfirmedDivergence | FindingCode::ExistingDivergence => {
                    tally.divergences += 1
                }
                FindingCode::RetainedPrior => tally.retained_prior += 1,
                FindingCode::InvalidDateOrder => tally.cross_field_errors += 1,
                FindingCode::LongCoveragePeriod | FindingCode::DeductibleExceedsPremium => {
                    tally.cross_field_warnings += 1
                }
                FindingCode::FinancialInconsistency => tally.cross_field_reviews += 1,
            }
        }
        tally
    }

    /// Total points to deduct under `penalties`.
    pub fn deduction(&self, penalties: &PenaltyConfig) -> u32 {
        [
            (self.required_missing, penalties.required_missing),
            (self.validation_failures, penalties.validation_failure),
            (self.divergences, penalties.divergence),
            (self.retained_prior, penalties.retained_prior),
            (self.cross_field_errors, penalties.cross_field_error),
            (self.cross_field_warnings, penalties.cross_field_warning),
            (self.cross_field_reviews, penalties.cross_field_review),
        ]
        .iter()
        .fold(0u32, |acc, (count, points)| {
            acc.saturating_add(count.saturating_mul(*points))
        })
    }
}

/// 100 minus all deductions, clamped at 0.
pub fn quality_score(tally: &PenaltyTally, penalties: &PenaltyConfig) -> u8 {
    100u32.saturating_sub(tally.deduction(penalties)) as u8
}

pub fn reliability(score: u8, tiers: &TierConfig) -> SourceReliability {
    if score >= tiers.high {
        SourceReliability::High
    } else if score >= tiers.medium {
        SourceReliability::Medium
    } else {
        SourceReliability::Low
    }
}
