//! CSV import: one raw candidate per data row.

use serde_json::Value;

use crate::error::ReconcileError;
use crate::extract::RawCandidate;

/// Parse `csv_data` (with headers) into `(record_id, candidate)` pairs.
///
/// Each non-empty cell becomes a string entry under its header, so the
/// usual alias table applies to sheet columns. Rows with an empty id are
/// skipped.
pub fn load_csv_candidates(
    csv_data: &str,
    id_column: &str,
) -> Result<Vec<(String, RawCandidate)>, ReconcileError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconcileError::Io(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let id_idx = headers
        .iter()
        .position(|h| h == id_column)
        .ok_or_else(|| ReconcileError::MissingColumn {
            column: id_column.into(),
        })?;

    let mut candidates = Vec::new();

    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| ReconcileError::Io(e.to_string()))?;

        let record_id = record.get(id_idx).unwrap_or("").to_string();
        if record_id.is_empty() {
            log::warn!("row {}: empty '{id_column}', skipped", line + 2);
            continue;
        }

        let mut candidate = RawCandidate::default();
        for (i, h) in headers.iter().enumerate() {
            if i == id_idx {
                continue;
            }
            match record.get(i) {
                Some(val) if !val.is_empty() => {
                    candidate.insert(h.clone(), Value::String(val.to_string()))
                }
                _ => {}
            }
        }

        candidates.push((record_id, candidate));
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SHEET: &str = "\
id,seguradora,numero_apolice,premio,inicio_vigencia,fim_vigencia
pol-1,Acme Seguros,12345-X,\"R$ 1.200,00\",01/01/2024,01/01/2025
,Sem Id,99999,100,01/01/2024,01/01/2025
pol-2,Outra Cia,55555-Z,,01/02/2024,01/02/2025
";

    #[test]
    fn rows_become_candidates() {
        let rows = load_csv_candidates(SHEET, "id").unwrap();
        assert_eq!(rows.len(), 2);

        let (id, first) = &rows[0];
        assert_eq!(id, "pol-1");
        assert_eq!(first.get("premio"), Some(&json!("R$ 1.200,00")));
        assert_eq!(first.get("id"), None);

        let (id, second) = &rows[1];
        assert_eq!(id, "pol-2");
        assert_eq!(second.get("premio"), None);
    }

    #[test]
    fn missing_id_column() {
        let err = load_csv_candidates(SHEET, "policy_id").unwrap_err();
        assert_eq!(
            err,
            ReconcileError::MissingColumn {
                column: "policy_id".into()
            }
        );
    }
}
