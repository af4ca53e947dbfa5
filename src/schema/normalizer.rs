//! Raw table → normalized dataset.
//!
//! Steps, in order:
//! 1. canonical header names, then category aliases
//! 2. text trimming and department-name cleanup
//! 3. numeric and year coercion of declared columns
//! 4. derived totals
//!
//! The transform is pure. No cell failure rejects a row or the table: an
//! unparseable number becomes `Missing`, a missing total part counts as zero.

use std::collections::HashSet;
use tracing::debug;

use crate::models::{Dataset, DatasetCategory, RawTable, Record, Value};

use super::coerce::{coerce_value, coerce_year_value};
use super::columns::canonical_column_name;
use super::profile::{CategoryProfile, DEPARTMENT_COLUMN, profile};

/// Normalize a fetched table into a dataset of `category`.
pub fn normalize(raw: RawTable, category: DatasetCategory) -> Dataset {
    let profile = profile(category);
    let mapping = column_mapping(&raw.columns, profile);

    let mut columns: Vec<String> = mapping.iter().map(|(_, name)| name.clone()).collect();
    for derived in profile.derived {
        if !columns.iter().any(|c| c == derived.column) {
            columns.push(derived.column.to_string());
        }
    }

    let mut unparsed = 0usize;
    let rows: Vec<Record> = raw
        .rows
        .into_iter()
        .map(|mut row| {
            let mut record = Record::new();
            for (raw_name, name) in &mapping {
                let cell = clean_cell(row.remove(raw_name).unwrap_or_default());
                let value = coerce_cell(profile, name, cell, &mut unparsed);
                record.insert(name.clone(), value);
            }
            derive_totals(profile, &mut record);
            record
        })
        .collect();

    debug!(
        category = %category,
        rows = rows.len(),
        columns = columns.len(),
        unparsed_numeric_cells = unparsed,
        "Normalized dataset"
    );

    Dataset::new(category, columns, rows)
}

/// Pair each raw header with its final name. When two headers land on the
/// same name the first one wins.
fn column_mapping(raw_columns: &[String], profile: &CategoryProfile) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut mapping = Vec::with_capacity(raw_columns.len());

    for raw_name in raw_columns {
        let canonical = canonical_column_name(raw_name);
        if canonical.is_empty() {
            debug!(column = %raw_name, "Skipping column with empty canonical name");
            continue;
        }
        let name = profile.resolve_column(&canonical).to_string();
        if !seen.insert(name.clone()) {
            debug!(column = %raw_name, canonical = %name, "Dropping duplicate column");
            continue;
        }
        mapping.push((raw_name.clone(), name));
    }

    mapping
}

fn clean_cell(value: Value) -> Value {
    match value {
        Value::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Value::Missing
            } else if trimmed.len() == s.len() {
                Value::Text(s)
            } else {
                Value::Text(trimmed.to_string())
            }
        }
        other => other,
    }
}

fn coerce_cell(
    profile: &CategoryProfile,
    column: &str,
    cell: Value,
    unparsed: &mut usize,
) -> Value {
    if column == profile.year_column {
        return coerce_year_value(&cell);
    }

    if profile.is_numeric(column) {
        let coerced = coerce_value(&cell);
        if coerced.is_missing() && !cell.is_missing() {
            *unparsed += 1;
        }
        return coerced;
    }

    match cell {
        Value::Text(s) if column == DEPARTMENT_COLUMN => {
            Value::Text(profile.department_rule.apply(&s))
        }
        other => other,
    }
}

fn derive_totals(profile: &CategoryProfile, record: &mut Record) {
    for derived in profile.derived {
        let total: f64 = derived
            .parts
            .iter()
            .filter_map(|part| record.get(part).as_f64())
            .sum();
        record.insert(derived.column, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|cells| {
                    columns
                        .iter()
                        .zip(cells.iter())
                        .map(|(c, v)| (c.to_string(), Value::from(*v)))
                        .collect()
                })
                .collect(),
        }
    }

    #[test]
    fn test_improvement_program_end_to_end() {
        let raw = table(
            &["departamento", "no_sfv_asignados", "valor_asignado"],
            &[&["BOGOTA D. C.", "1,000", "$50.000.000"]],
        );
        let dataset = normalize(raw, DatasetCategory::ImprovementProgram);

        let row = &dataset.rows()[0];
        assert_eq!(row.get("departamento"), &Value::from("BOGOTÁ, D.C."));
        assert_eq!(row.get("no_sfv_asignados"), &Value::Number(1000.0));
        assert_eq!(row.get("valor_asignado"), &Value::Number(50_000_000.0));
    }

    #[test]
    fn test_declared_numeric_columns_hold_only_numbers() {
        let raw = table(
            &["Departamento", "Hogares", "Valor Asignado", "Año de Asignación"],
            &[
                &["ANTIOQUIA", "1.234", "$ 12.000.000", "2021"],
                &["CESAR", "n/a", "", "1900"],
                &["HUILA", "  ", "9,500", "dos mil"],
            ],
        );

        for category in DatasetCategory::ALL {
            let dataset = normalize(raw.clone(), category);
            let p = profile(category);
            for row in dataset.rows() {
                for column in p.numeric_columns {
                    assert!(
                        matches!(row.get(column), Value::Number(_) | Value::Missing),
                        "{category}.{column} = {:?}",
                        row.get(column)
                    );
                }
                assert!(matches!(
                    row.get(p.year_column),
                    Value::Integer(_) | Value::Missing
                ));
            }
        }
    }

    #[test]
    fn test_general_api_headers_are_aliased() {
        let raw = table(
            &["departamento", "hogares", "a_o_de_asignaci_n", "estado_de_postulaci_n"],
            &[&["META", "4", "2019", "Asignado"]],
        );
        let dataset = normalize(raw, DatasetCategory::General);

        assert_eq!(
            dataset.columns(),
            ["departamento", "hogares", "ano_de_asignacion", "estado_de_postulacion"]
        );
        let row = &dataset.rows()[0];
        assert_eq!(row.get("ano_de_asignacion"), &Value::Integer(2019));
        assert_eq!(row.get("hogares"), &Value::Number(4.0));
    }

    #[test]
    fn test_derived_totals_treat_missing_as_zero() {
        let raw = table(
            &["Departamento", "VIS Urbana", "VIS Rural", "No VIS Urbana"],
            &[&["SUCRE", "3", "", "2"]],
        );
        let dataset = normalize(raw, DatasetCategory::UsedHousing);
        let row = &dataset.rows()[0];

        assert_eq!(row.get("total_vis"), &Value::Number(3.0));
        // no_vis_rural is absent from the export altogether
        assert_eq!(row.get("total_no_vis"), &Value::Number(2.0));
        assert_eq!(row.get("total_subsidios"), &Value::Number(5.0));
        assert!(!dataset.has_column("no_vis_rural"));
        assert!(dataset.has_column("total_vis"));
    }

    #[test]
    fn test_military_total_without_branch_columns_is_zero() {
        let raw = table(&["Departamento", "Año"], &[&["CAUCA", "2020"]]);
        let dataset = normalize(raw, DatasetCategory::Military);
        let row = &dataset.rows()[0];

        assert_eq!(row.get("total_subsidios"), &Value::Number(0.0));
        assert_eq!(row.get("vigencia"), &Value::Integer(2020));
    }

    #[test]
    fn test_decomposed_year_header_is_recognized() {
        let raw = table(
            &["Departamento", "An\u{303}o", "Hogares"],
            &[&["NARIN\u{303}O", "1899", "2"], &["CAUCA", "2015", "1"]],
        );
        let dataset = normalize(raw, DatasetCategory::Rural);

        assert!(dataset.has_column("ano"));
        assert!(dataset.rows()[0].get("ano").is_missing());
        assert_eq!(dataset.rows()[1].get("ano"), &Value::Integer(2015));
    }

    #[test]
    fn test_absent_columns_are_not_synthesized() {
        let raw = table(&["departamento"], &[&["META"]]);
        let dataset = normalize(raw, DatasetCategory::Rural);
        assert_eq!(dataset.columns(), ["departamento"]);
        assert!(!dataset.rows()[0].contains("hogares"));
    }

    #[test]
    fn test_normalizing_twice_keeps_column_names() {
        let raw = table(
            &["Departamento", "Ejército Nacional", "Armada", "Valor Total", "Año"],
            &[&["BOYACÁ", "1", "2", "$1.000", "2018"]],
        );
        let once = normalize(raw, DatasetCategory::Military);
        let twice = normalize(RawTable::from(&once), DatasetCategory::Military);

        assert_eq!(once.columns(), twice.columns());
        assert_eq!(once.rows(), twice.rows());
    }

    #[test]
    fn test_duplicate_headers_keep_first() {
        let raw = table(&["Hogares", "hogares"], &[&["1", "2"]]);
        let dataset = normalize(raw, DatasetCategory::Rural);
        assert_eq!(dataset.columns(), ["hogares"]);
        assert_eq!(dataset.rows()[0].get("hogares"), &Value::Number(1.0));
    }

    #[test]
    fn test_text_cells_are_trimmed_and_blank_is_missing() {
        let raw = table(&["municipio", "programa"], &[&["  TUNJA ", "   "]]);
        let dataset = normalize(raw, DatasetCategory::General);
        let row = &dataset.rows()[0];
        assert_eq!(row.get("municipio"), &Value::from("TUNJA"));
        assert!(row.get("programa").is_missing());
    }
}
