//! Locating candidate values inside arbitrarily-shaped raw input.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::config::AliasConfig;
use crate::error::ReconcileError;
use crate::model::LogicalField;

/// Nesting groups historical sources place fields under, searched in order
/// after the top level.
const BUILTIN_GROUPS: &[&str] = &[
    "informacoes_gerais",
    "informacoesGerais",
    "general_info",
    "generalInfo",
    "seguradora",
    "insurer",
    "dados_financeiros",
    "financeiro",
    "valores",
    "financials",
    "vigencia",
    "periodo_cobertura",
    "coverage_period",
    "coveragePeriod",
];

fn builtin_aliases(field: LogicalField) -> &'static [&'static str] {
    match field {
        LogicalField::Insurer => &[
            "insurer",
            "insurerName",
            "insurer_name",
            "seguradora",
            "nome_seguradora",
            "companhia",
        ],
        LogicalField::PolicyNumber => &[
            "policyNumber",
            "policy_number",
            "numero_apolice",
            "numeroApolice",
            "apolice",
            "numero",
        ],
        LogicalField::InsuredName => &[
            "insuredName",
            "insured_name",
            "segurado",
            "nome_segurado",
            "titular",
            "policyholder",
        ],
        LogicalField::Premium => &[
            "premium",
            "annualPremium",
            "premio",
            "premio_anual",
            "premio_total",
            "valor_premio",
        ],
        LogicalField::MonthlyAmount => &[
            "monthlyAmount",
            "monthly_amount",
            "custo_mensal",
            "valor_mensal",
            "mensalidade",
            "parcela",
        ],
        LogicalField::StartDate => &[
            "startDate",
            "start_date",
            "inicio_vigencia",
            "data_inicio",
            "vigencia_inicio",
            "inicio",
        ],
        LogicalField::EndDate => &[
            "endDate",
            "end_date",
            "fim_vigencia",
            "data_fim",
            "vigencia_fim",
            "fim",
        ],
        LogicalField::Deductible => &["deductible", "franquia", "valor_franquia"],
    }
}

// ---------------------------------------------------------------------------
// Raw candidate
// ---------------------------------------------------------------------------

/// Raw output of an extraction or ingestion collaborator: a JSON object of
/// any shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCandidate {
    fields: Map<String, Value>,
}

impl RawCandidate {
    /// Anything other than a JSON object is a collaborator bug.
    pub fn from_value(value: Value) -> Result<Self, ReconcileError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(ReconcileError::NotAnObject {
                found: json_type_name(&other),
            }),
        }
    }

    pub fn from_json(input: &str) -> Result<Self, ReconcileError> {
        let value: Value =
            serde_json::from_str(input).map_err(|e| ReconcileError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<Map<String, Value>> for RawCandidate {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Alias table for every logical field plus the nesting groups to search.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    aliases: BTreeMap<LogicalField, Vec<String>>,
    groups: Vec<String>,
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new(&AliasConfig::default())
    }
}

impl FieldExtractor {
    /// Built-in aliases and groups, followed by any configured extras.
    pub fn new(extra: &AliasConfig) -> Self {
        let aliases = LogicalField::ALL
            .into_iter()
            .map(|field| {
                let mut keys: Vec<String> =
                    builtin_aliases(field).iter().map(|k| k.to_string()).collect();
                for key in extra.extra_for(field) {
                    if !keys.iter().any(|k| k == key) {
                        keys.push(key.to_string());
                    }
                }
                (field, keys)
            })
            .collect();

        let mut groups: Vec<String> = BUILTIN_GROUPS.iter().map(|g| g.to_string()).collect();
        for group in &extra.groups {
            if !groups.contains(group) {
                groups.push(group.clone());
            }
        }

        Self { aliases, groups }
    }

    pub fn aliases(&self, field: LogicalField) -> &[String] {
        self.aliases.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First usable value for `field`: aliases at the top level, then the
    /// same aliases inside each nesting group. A single alias's value is
    /// returned whole; values are never combined across aliases.
    pub fn extract<'a>(&self, raw: &'a RawCandidate, field: LogicalField) -> Option<&'a Value> {
        let aliases = self.aliases(field);

        if let Some(v) = first_usable(raw.as_map(), aliases) {
            return Some(v);
        }

        self.groups.iter().find_map(|group| match raw.get(group) {
            Some(Value::Object(nested)) => first_usable(nested, aliases),
            _ => None,
        })
    }
}

fn first_usable<'a>(map: &'a Map<String, Value>, aliases: &[String]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|key| map.get(key))
        .find(|v| is_usable(v))
}

/// A non-blank string or a number. Objects and arrays under an alias key
/// are groupings, and no field is typed as a boolean.
fn is_usable(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(_) => true,
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => false,
    }
}
