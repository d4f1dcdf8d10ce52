//! Plausibility checks on normalized values.
//!
//! A failure lowers confidence and produces a warning; it never stops the
//! value from being merged.

use chrono::Datelike;

use crate::config::Limits;
use crate::model::{FieldValue, LogicalField};

/// Check a normalized value of `field`. `Err` carries the reason.
pub fn validate_field(field: LogicalField, value: &FieldValue, limits: &Limits) -> Result<(), String> {
    match (field, value) {
        (LogicalField::Insurer, FieldValue::Text(s)) => {
            if s.chars().any(char::is_alphabetic) {
                Ok(())
            } else {
                Err(format!("insurer '{s}' contains no letters"))
            }
        }
        (LogicalField::PolicyNumber, FieldValue::Text(s)) => {
            if !s.chars().any(|c| c.is_ascii_digit()) {
                return Err(format!("policy number '{s}' contains no digits"));
            }
            match s
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '/' | '-')))
            {
                Some(bad) => Err(format!("policy number '{s}' contains unexpected '{bad}'")),
                None => Ok(()),
            }
        }
        (LogicalField::InsuredName, FieldValue::Text(s)) => {
            if s.chars().any(|c| c.is_ascii_digit()) {
                Err(format!("insured name '{s}' contains digits"))
            } else {
                Ok(())
            }
        }
        (_, FieldValue::Money(m)) => {
            if m.as_f64() > limits.max_amount {
                Err(format!(
                    "{} {m} exceeds the plausible maximum of {:.2}",
                    field.label(),
                    limits.max_amount
                ))
            } else {
                Ok(())
            }
        }
        (_, FieldValue::Date(d)) => {
            if (limits.min_year..=limits.max_year).contains(&d.year()) {
                Ok(())
            } else {
                Err(format!(
                    "{} {} is outside {}..={}",
                    field.label(),
                    d.format("%Y-%m-%d"),
                    limits.min_year,
                    limits.max_year
                ))
            }
        }
        (_, other) => Err(format!("{} has an unexpected value '{other}'", field.label())),
    }
}
