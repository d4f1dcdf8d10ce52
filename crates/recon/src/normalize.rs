//! Per-type normalizers.
//!
//! Every function here is total: input that cannot be coerced without
//! changing its meaning yields `None`, which reconciliation reads as
//! "field not found", never as an empty or zero value.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::config::Limits;
use crate::model::{FieldKind, FieldValue, LogicalField, Money};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Normalize `raw` according to the semantic type of `field`.
pub fn normalize_field(field: LogicalField, raw: &Value, limits: &Limits) -> Option<FieldValue> {
    match field.kind() {
        FieldKind::Text => normalize_text(raw).map(FieldValue::Text),
        FieldKind::PersonName => {
            normalize_person_name(raw, limits.min_name_len).map(FieldValue::Text)
        }
        FieldKind::PolicyNumber => {
            normalize_policy_number(raw, limits.min_policy_number_len).map(FieldValue::Text)
        }
        FieldKind::Money { allow_zero } => normalize_money(raw, allow_zero).map(FieldValue::Money),
        FieldKind::Date => normalize_date(raw).map(FieldValue::Date),
    }
}

/// Strings as-is, numbers in their JSON spelling, anything else rejected.
fn scalar_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Identifier-like text: trimmed and upper-cased.
pub fn normalize_text(raw: &Value) -> Option<String> {
    let text = scalar_text(raw)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Person name: trimmed, at least `min_len` characters, each word title-cased.
pub fn normalize_person_name(raw: &Value, min_len: usize) -> Option<String> {
    let text = match raw {
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    if text.chars().count() < min_len {
        return None;
    }
    let words: Vec<String> = text.split_whitespace().map(title_case_word).collect();
    Some(words.join(" "))
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// Policy number: trimmed, at least `min_len` characters, case preserved.
pub fn normalize_policy_number(raw: &Value, min_len: usize) -> Option<String> {
    let text = scalar_text(raw)?;
    let trimmed = text.trim();
    if trimmed.chars().count() < min_len {
        return None;
    }
    Some(trimmed.to_string())
}

/// Monetary value from a number or a formatted string, rounded to cents.
///
/// Negative amounts are rejected; zero only when `allow_zero`.
pub fn normalize_money(raw: &Value, allow_zero: bool) -> Option<Money> {
    let amount = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_amount(s)?,
        _ => return None,
    };
    if amount < 0.0 {
        return None;
    }
    let money = Money::from_f64(amount)?;
    if money.cents() == 0 && !allow_zero {
        return None;
    }
    Some(money)
}

/// Parse a formatted amount such as `"R$ 1.234,56"`, `"$1,234.56"` or `"99,9"`.
///
/// Only a currency token at either end (`R$`, `US$`, `€`, `BRL`, ...) and
/// surrounding whitespace are dropped. Whatever remains must be a single
/// run of digits and separators with an optional leading `-`; prose,
/// exponents or several numbers yield `None`.
///
/// When both `.` and `,` appear, the last one is the decimal separator. A
/// single kind of separator is a thousands separator if it repeats, or if it
/// occurs once after a 1–3 digit non-zero integer part and is followed by
/// exactly three digits; otherwise it is the decimal separator.
pub fn parse_amount(input: &str) -> Option<f64> {
    let mut rest = input.trim();
    let mut negative = false;
    if let Some(stripped) = rest.strip_prefix('-') {
        negative = true;
        rest = stripped.trim_start();
    }

    rest = strip_currency_prefix(rest);
    if !negative {
        if let Some(stripped) = rest.strip_prefix('-') {
            negative = true;
            rest = stripped;
        }
    }
    let body = strip_currency_suffix(rest);

    if body.is_empty()
        || !body.starts_with(|c: char| c.is_ascii_digit())
        || !body.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | ','))
    {
        return None;
    }

    let canonical = match (body.rfind('.'), body.rfind(',')) {
        (Some(dot), Some(comma)) => {
            let (decimal, thousands) = if dot > comma { ('.', ',') } else { (',', '.') };
            if body.matches(decimal).count() > 1 {
                return None;
            }
            body.replace(thousands, "").replace(decimal, ".")
        }
        (Some(_), None) => single_separator(body, '.'),
        (None, Some(_)) => single_separator(body, ','),
        (None, None) => body.to_string(),
    };

    let value: f64 = canonical.parse().ok()?;
    Some(if negative { -value } else { value })
}

fn is_currency_char(c: char) -> bool {
    c.is_alphabetic() || is_currency_sign(c)
}

fn is_currency_sign(c: char) -> bool {
    matches!(c, '$' | '€' | '£' | '¥')
}

/// A run carrying a currency sign (`R$`, `US$`, `€`) or an ISO code (`BRL`).
fn is_currency_token(token: &str) -> bool {
    token.chars().any(is_currency_sign)
        || (token.len() == 3 && token.chars().all(|c| c.is_ascii_uppercase()))
}

fn strip_currency_prefix(s: &str) -> &str {
    let end = s.find(|c: char| !is_currency_char(c)).unwrap_or(s.len());
    if end > 0 && is_currency_token(&s[..end]) {
        s[end..].trim_start()
    } else {
        s
    }
}

fn strip_currency_suffix(s: &str) -> &str {
    let start = s
        .char_indices()
        .rev()
        .find(|(_, c)| !is_currency_char(*c))
        .map_or(0, |(i, c)| i + c.len_utf8());
    if start < s.len() && is_currency_token(&s[start..]) {
        s[..start].trim_end()
    } else {
        s
    }
}

fn single_separator(body: &str, sep: char) -> String {
    if body.matches(sep).count() > 1 {
        return body.replace(sep, "");
    }
    let (int_part, frac_part) = body.split_once(sep).unwrap_or((body, ""));
    let grouped = frac_part.len() == 3
        && (1..=3).contains(&int_part.len())
        && int_part != "0";
    if grouped {
        format!("{int_part}{frac_part}")
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// Calendar date from ISO, slash/dash/dot day-first, or timestamp strings.
/// Years before 1000 (two-digit years) are rejected.
pub fn normalize_date(raw: &Value) -> Option<NaiveDate> {
    let text = match raw {
        Value::String(s) => s.trim(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }

    let parsed = DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        })?;

    if parsed.year() < 1000 {
        return None;
    }
    Some(parsed)
}

/// Whether the canonical value differs in form from the raw input.
pub fn changed_by_normalization(raw: &Value, value: &FieldValue) -> bool {
    match (raw, value) {
        (Value::String(s), FieldValue::Text(t)) => s != t,
        (Value::Number(n), FieldValue::Text(t)) => n.to_string() != *t,
        (Value::String(s), FieldValue::Money(m)) => match s.parse::<f64>() {
            Ok(plain) => !same_cents(plain, *m),
            Err(_) => true,
        },
        (Value::Number(n), FieldValue::Money(m)) => match n.as_f64() {
            Some(plain) => !same_cents(plain, *m),
            None => true,
        },
        (Value::String(s), FieldValue::Date(d)) => *s != d.format("%Y-%m-%d").to_string(),
        _ => true,
    }
}

fn same_cents(plain: f64, money: Money) -> bool {
    (plain * 100.0 - money.cents() as f64).abs() < 1e-6
}
