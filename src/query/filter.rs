//! Row predicates: equality on categorical columns, inclusive year range.

use crate::models::Record;

/// Conjunction of column predicates. An empty filter keeps every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Column → accepted rendered values
    equals: Vec<(String, Vec<String>)>,
    years: Option<(i64, i64)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep rows whose `column` renders exactly as `value`.
    pub fn with_equals(self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_any_of(column, [value.into()])
    }

    /// Keep rows whose `column` renders as any of `values`. An empty set
    /// does not restrict.
    pub fn with_any_of<I, S>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let column = column.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return self;
        }

        match self.equals.iter_mut().find(|(c, _)| *c == column) {
            Some((_, existing)) => *existing = values,
            None => self.equals.push((column, values)),
        }
        self
    }

    /// Keep rows whose year falls in `from..=to`. Rows with a missing year
    /// are dropped once a range is set.
    pub fn with_years(mut self, from: i64, to: i64) -> Self {
        self.years = Some((from.min(to), from.max(to)));
        self
    }

    pub fn years(&self) -> Option<(i64, i64)> {
        self.years
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty() && self.years.is_none()
    }

    /// Whether `record` passes; `year_column` names the column the year
    /// range applies to.
    pub fn matches(&self, record: &Record, year_column: &str) -> bool {
        let categorical = self.equals.iter().all(|(column, accepted)| {
            let cell = record.get(column);
            !cell.is_missing() && accepted.iter().any(|v| *v == cell.render())
        });
        if !categorical {
            return false;
        }

        match self.years {
            Some((from, to)) => record
                .get(year_column)
                .as_i64()
                .is_some_and(|year| (from..=to).contains(&year)),
            None => true,
        }
    }
}
