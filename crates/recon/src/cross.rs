//! Relationship checks on the merged record. These annotate; they never
//! change a value.

use chrono::Months;

use crate::config::ToleranceConfig;
use crate::model::{Finding, FindingCode, LogicalField, PolicyRecord};

/// Run every cross-field check against `record`.
pub fn check_cross_fields(record: &PolicyRecord, tolerance: &ToleranceConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    check_coverage_period(record, tolerance, &mut findings);
    check_monthly_amount(record, tolerance, &mut findings);
    check_deductible(record, &mut findings);
    findings
}

fn check_coverage_period(
    record: &PolicyRecord,
    tolerance: &ToleranceConfig,
    findings: &mut Vec<Finding>,
) {
    let (Some(start), Some(end)) = (record.start_date, record.end_date) else {
        return;
    };
    let fields = vec![LogicalField::StartDate, LogicalField::EndDate];

    if end <= start {
        findings.push(Finding::new(
            FindingCode::InvalidDateOrder,
            fields,
            format!("end date {end} must be after start date {start}"),
        ));
        return;
    }

    let limit = start.checked_add_months(Months::new(tolerance.max_coverage_months));
    if limit.is_some_and(|limit| end > limit) {
        findings.push(Finding::new(
            FindingCode::LongCoveragePeriod,
            fields,
            format!(
                "unusually long validity period: {start} to {end} exceeds {} months",
                tolerance.max_coverage_months
            ),
        ));
    }
}

fn check_monthly_amount(
    record: &PolicyRecord,
    tolerance: &ToleranceConfig,
    findings: &mut Vec<Finding>,
) {
    let (Some(premium), Some(monthly)) = (record.premium, record.monthly_amount) else {
        return;
    };

    // |monthly - premium/12| > tol * premium/12, scaled by 12 to stay in cents
    let annualized = monthly.cents() as f64 * 12.0;
    let premium_cents = premium.cents() as f64;
    if (annualized - premium_cents).abs() > tolerance.monthly_deviation * premium_cents {
        findings.push(Finding::new(
            FindingCode::FinancialInconsistency,
            vec![LogicalField::Premium, LogicalField::MonthlyAmount],
            format!(
                "monthly amount {monthly} inconsistent with annual premium {premium} (expected about {:.2})",
                premium.as_f64() / 12.0
            ),
        ));
    }
}

fn check_deductible(record: &PolicyRecord, findings: &mut Vec<Finding>) {
    let (Some(premium), Some(deductible)) = (record.premium, record.deductible) else {
        return;
    };
    if deductible > premium {
        findings.push(Finding::new(
            FindingCode::DeductibleExceedsPremium,
            vec![LogicalField::Deductible, LogicalField::Premium],
            format!("deductible {deductible} exceeds premium {premium}"),
        ));
    }
}
