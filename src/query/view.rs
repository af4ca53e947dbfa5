//! Read-only views over a normalized dataset.
//!
//! A [`QueryView`] borrows the cached dataset and narrows it to the rows that
//! pass a [`Filter`]. Every aggregate is computed on demand; nothing here
//! mutates the dataset.

use crate::models::{Dataset, Record};
use crate::schema::{CategoryProfile, DEPARTMENT_COLUMN, VALUE_COLUMN, profile};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use super::Filter;

/// Borrowed, filtered slice of a dataset.
#[derive(Debug, Clone)]
pub struct QueryView<'a> {
    dataset: &'a Dataset,
    profile: &'static CategoryProfile,
    rows: Vec<&'a Record>,
}

impl<'a> QueryView<'a> {
    /// View over every row.
    pub fn new(dataset: &'a Dataset) -> Self {
        Self {
            dataset,
            profile: profile(dataset.category()),
            rows: dataset.rows().iter().collect(),
        }
    }

    /// Narrow the view to rows passing `filter`.
    pub fn filter(&self, filter: &Filter) -> Self {
        let year_column = self.profile.year_column;
        Self {
            dataset: self.dataset,
            profile: self.profile,
            rows: self
                .rows
                .iter()
                .copied()
                .filter(|row| filter.matches(row, year_column))
                .collect(),
        }
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    pub fn profile(&self) -> &'static CategoryProfile {
        self.profile
    }

    pub fn rows(&self) -> &[&'a Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sorted distinct non-missing values of `column`, as rendered.
    pub fn distinct(&self, column: &str) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.get(column))
            .filter(|cell| !cell.is_missing())
            .map(|cell| cell.render())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// The category's filter columns present in the dataset, each with the
    /// values it can take in this view.
    pub fn filter_choices(&self) -> Vec<(&'static str, Vec<String>)> {
        self.profile
            .filter_columns
            .iter()
            .copied()
            .filter(|column| self.dataset.has_column(column))
            .map(|column| (column, self.distinct(column)))
            .collect()
    }

    /// Number of distinct non-missing values of `column`.
    pub fn nunique(&self, column: &str) -> usize {
        self.distinct(column).len()
    }

    /// Sum of a numeric column; missing and non-numeric cells count as 0.
    pub fn sum(&self, column: &str) -> f64 {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).as_f64())
            .sum()
    }

    /// Smallest and largest year in the view.
    pub fn year_bounds(&self) -> Option<(i64, i64)> {
        let years = self
            .rows
            .iter()
            .filter_map(|row| row.get(self.profile.year_column).as_i64());
        years.fold(None, |bounds, year| match bounds {
            None => Some((year, year)),
            Some((lo, hi)) => Some((lo.min(year), hi.max(year))),
        })
    }

    /// Headline indicators of the view.
    pub fn totals(&self) -> Totals {
        let beneficiary_column = self.profile.beneficiary_column;
        Totals {
            records: self.len(),
            beneficiaries: self
                .dataset
                .has_column(beneficiary_column)
                .then(|| self.sum(beneficiary_column)),
            amount: self
                .dataset
                .has_column(VALUE_COLUMN)
                .then(|| self.sum(VALUE_COLUMN)),
            departments: self
                .dataset
                .has_column(DEPARTMENT_COLUMN)
                .then(|| self.nunique(DEPARTMENT_COLUMN)),
        }
    }

    /// Sum `columns` per distinct value of `by`. Rows with a missing key are
    /// skipped. Groups come out in key order; see [`Grouped::sort_desc`].
    pub fn group_sum(&self, by: &str, columns: &[&str]) -> Grouped {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();

        for row in &self.rows {
            let key = row.get(by);
            if key.is_missing() {
                continue;
            }
            let slot = *index.entry(key.render()).or_insert_with_key(|key| {
                groups.push(Group {
                    key: key.clone(),
                    sums: vec![0.0; columns.len()],
                    records: 0,
                });
                groups.len() - 1
            });

            let group = &mut groups[slot];
            group.records += 1;
            for (sum, column) in group.sums.iter_mut().zip(columns) {
                *sum += row.get(column).as_f64().unwrap_or(0.0);
            }
        }

        groups.sort_by(|a, b| compare_keys(&a.key, &b.key));

        Grouped {
            by: by.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            groups,
        }
    }
}

/// Numeric keys (years) compare as numbers, everything else as text.
fn compare_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y),
        _ => a.cmp(b),
    }
}

/// Headline indicators. `None` when the dataset lacks the column.
#[derive(Debug, Clone, PartialEq)]
pub struct Totals {
    pub records: usize,
    pub beneficiaries: Option<f64>,
    pub amount: Option<f64>,
    pub departments: Option<usize>,
}

/// One group of a [`Grouped`] result.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: String,
    /// One sum per requested column, in request order
    pub sums: Vec<f64>,
    pub records: usize,
}

/// Result of [`QueryView::group_sum`].
#[derive(Debug, Clone, PartialEq)]
pub struct Grouped {
    pub by: String,
    pub columns: Vec<String>,
    pub groups: Vec<Group>,
}

impl Grouped {
    /// Sort by the sum of `column`, largest first. Ties keep key order.
    /// Unknown columns leave the order unchanged.
    pub fn sort_desc(mut self, column: &str) -> Self {
        if let Some(i) = self.columns.iter().position(|c| c == column) {
            self.groups
                .sort_by(|a, b| b.sums[i].total_cmp(&a.sums[i]));
        }
        self
    }

    /// Keep the first `n` groups.
    pub fn top(mut self, n: usize) -> Self {
        self.groups.truncate(n);
        self
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Sum of `column` for the group keyed `key`.
    pub fn get(&self, key: &str, column: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == column)?;
        self.groups
            .iter()
            .find(|g| g.key == key)
            .map(|g| g.sums[i])
    }
}

/// `1234567.4` → `1,234,567`. NaN and infinities render as `N/A`.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "N/A".to_string();
    }
    let rounded = value.round();
    let digits = format!("{}", rounded.abs() as u128);
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Pesos with thousands separators: `$1,234,567`.
pub fn format_currency(value: f64) -> String {
    match format_number(value) {
        n if n == "N/A" => n,
        n => format!("${n}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatasetCategory, Value};

    fn general() -> Dataset {
        let rows = [
            ("ANTIOQUIA", "MEDELLÍN", 2020, 4.0, 40.0),
            ("ANTIOQUIA", "BELLO", 2021, 2.0, 20.0),
            ("CESAR", "VALLEDUPAR", 2021, 5.0, 70.0),
            ("META", "VILLAVICENCIO", 2019, 1.0, 5.0),
        ]
        .into_iter()
        .map(|(dept, muni, year, hogares, valor)| {
            let mut r = Record::new();
            r.insert("departamento", dept);
            r.insert("municipio", muni);
            r.insert("ano_de_asignacion", Value::Integer(year));
            r.insert("hogares", hogares);
            r.insert("valor_asignado", valor);
            r
        })
        .collect();

        let columns = [
            "departamento",
            "municipio",
            "ano_de_asignacion",
            "hogares",
            "valor_asignado",
        ]
        .map(String::from)
        .to_vec();
        Dataset::new(DatasetCategory::General, columns, rows)
    }

    #[test]
    fn test_totals_over_filtered_view() {
        let dataset = general();
        let view = QueryView::new(&dataset).filter(&Filter::new().with_years(2020, 2021));

        assert_eq!(
            view.totals(),
            Totals {
                records: 3,
                beneficiaries: Some(11.0),
                amount: Some(130.0),
                departments: Some(2),
            }
        );
    }

    #[test]
    fn test_distinct_is_sorted_and_scoped_to_view() {
        let dataset = general();
        let view = QueryView::new(&dataset);
        assert_eq!(view.distinct("departamento"), vec!["ANTIOQUIA", "CESAR", "META"]);

        let antioquia = view.filter(&Filter::new().with_equals("departamento", "ANTIOQUIA"));
        assert_eq!(antioquia.distinct("municipio"), vec!["BELLO", "MEDELLÍN"]);
        assert_eq!(view.year_bounds(), Some((2019, 2021)));
        assert!(view.distinct("programa").is_empty());
    }

    #[test]
    fn test_filter_choices_skip_absent_columns() {
        let dataset = general();
        let choices = QueryView::new(&dataset).filter_choices();

        let columns: Vec<&str> = choices.iter().map(|(c, _)| *c).collect();
        assert_eq!(columns, vec!["departamento", "municipio"]);
        assert_eq!(choices[0].1.len(), 3);
    }

    #[test]
    fn test_group_sum_sort_and_top() {
        let dataset = general();
        let grouped = QueryView::new(&dataset)
            .group_sum("departamento", &["hogares", "valor_asignado"])
            .sort_desc("hogares")
            .top(2);

        let keys: Vec<&str> = grouped.groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["ANTIOQUIA", "CESAR"]);
        assert_eq!(grouped.get("ANTIOQUIA", "hogares"), Some(6.0));
        assert_eq!(grouped.get("CESAR", "valor_asignado"), Some(70.0));
        assert_eq!(grouped.groups[0].records, 2);
    }

    #[test]
    fn test_group_by_year_orders_numerically() {
        let dataset = general();
        let grouped = QueryView::new(&dataset).group_sum("ano_de_asignacion", &["hogares"]);

        let keys: Vec<&str> = grouped.groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["2019", "2020", "2021"]);
        assert_eq!(grouped.get("2021", "hogares"), Some(7.0));
    }

    #[test]
    fn test_absent_columns_yield_no_indicator() {
        let dataset = Dataset::new(
            DatasetCategory::Rural,
            vec!["municipio".to_string()],
            vec![Record::from_iter([("municipio", "TUNJA")])],
        );
        let totals = QueryView::new(&dataset).totals();
        assert_eq!(totals.records, 1);
        assert_eq!(totals.beneficiaries, None);
        assert_eq!(totals.departments, None);
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(1234567.4), "1,234,567");
        assert_eq!(format_number(999.0), "999");
        assert_eq!(format_number(-1000.0), "-1,000");
        assert_eq!(format_number(f64::NAN), "N/A");
        assert_eq!(format_currency(2500000.0), "$2,500,000");
    }
}
