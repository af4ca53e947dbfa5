//! Record and dataset types for subsidios.
//!
//! These types carry the data flow through the pipeline: fetchers produce a
//! [`RawTable`], the normalizer turns it into an immutable [`Dataset`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One of the five dataset variants published by the ministry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatasetCategory {
    /// National subsidy assignments; the only category with a live API
    General,
    /// Rural housing subsidies
    Rural,
    /// Subsidies for armed-forces and police personnel, by branch
    Military,
    /// Housing improvement program
    ImprovementProgram,
    /// Used-housing purchases, split VIS / No VIS
    UsedHousing,
}

impl DatasetCategory {
    pub const ALL: [DatasetCategory; 5] = [
        DatasetCategory::General,
        DatasetCategory::Rural,
        DatasetCategory::Military,
        DatasetCategory::ImprovementProgram,
        DatasetCategory::UsedHousing,
    ];

    /// Kebab-case identifier used on the command line and in config keys.
    pub fn slug(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Rural => "rural",
            Self::Military => "military",
            Self::ImprovementProgram => "improvement-program",
            Self::UsedHousing => "used-housing",
        }
    }

    /// Name used in snapshot source labels (`CSV-<name>`).
    pub fn name(self) -> &'static str {
        match self {
            Self::General => "General",
            Self::Rural => "Rural",
            Self::Military => "Military",
            Self::ImprovementProgram => "ImprovementProgram",
            Self::UsedHousing => "UsedHousing",
        }
    }

    /// Only General has a live API counterpart.
    pub fn has_live_api(self) -> bool {
        matches!(self, Self::General)
    }
}

impl fmt::Display for DatasetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Error returned when a category slug is not recognized.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown dataset category '{0}' (expected one of: general, rural, military, improvement-program, used-housing)")]
pub struct ParseCategoryError(String);

impl FromStr for DatasetCategory {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|c| c.slug() == wanted || c.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| ParseCategoryError(s.to_string()))
    }
}

/// A single cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Missing,
    Integer(i64),
    Number(f64),
    Text(String),
}

static MISSING: Value = Value::Missing;

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Numeric view of the cell; text is not parsed here.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Cell rendered for filter choices and CSV export. Missing renders empty.
    pub fn render(&self) -> String {
        match self {
            Self::Missing => String::new(),
            Self::Integer(i) => i.to_string(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Missing,
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Missing, Self::Number),
            serde_json::Value::Bool(b) => Self::Text(b.to_string()),
            nested => Self::Text(nested.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

/// One row: column name to cell. Absent columns read as [`Value::Missing`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(HashMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> &Value {
        self.0.get(column).unwrap_or(&MISSING)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::hash_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Rows as fetched, before any normalization.
///
/// Column order is first-seen order: API rows omit null fields, so a column
/// may first appear deep into the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl RawTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one JSON row object, registering unseen keys as columns.
    pub fn push_json_object(&mut self, object: serde_json::Map<String, serde_json::Value>) {
        let mut record = Record::new();
        for (key, value) in object {
            if !self.columns.iter().any(|c| c == &key) {
                self.columns.push(key.clone());
            }
            record.insert(key, Value::from(value));
        }
        self.rows.push(record);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl From<&Dataset> for RawTable {
    fn from(dataset: &Dataset) -> Self {
        Self {
            columns: dataset.columns.clone(),
            rows: dataset.rows.clone(),
        }
    }
}

/// Which kind of source produced a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Api,
    Snapshot,
}

/// Source label shown next to a dataset: `API` or `CSV-<Category>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceLabel {
    Api,
    Snapshot(DatasetCategory),
}

impl SourceLabel {
    pub fn kind(self) -> SourceKind {
        match self {
            Self::Api => SourceKind::Api,
            Self::Snapshot(_) => SourceKind::Snapshot,
        }
    }
}

impl fmt::Display for SourceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => f.write_str("API"),
            Self::Snapshot(category) => write!(f, "CSV-{}", category.name()),
        }
    }
}

/// Freshness of one source for the General category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessSignal {
    pub source: SourceKind,
    /// `YYYYMMDD`
    pub as_of: String,
}

/// Whether a fetch delivered every row the source had.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Completeness {
    #[default]
    Complete,
    /// Pagination stopped early; rows fetched before the failure are kept.
    Partial { reason: String },
}

/// An ordered, immutable set of normalized records of one category.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    category: DatasetCategory,
    columns: Vec<String>,
    rows: Vec<Record>,
    as_of: String,
    source: SourceLabel,
    completeness: Completeness,
}

impl Dataset {
    /// Build a dataset; the source defaults to the category snapshot until
    /// [`Dataset::with_source`] stamps it.
    pub fn new(category: DatasetCategory, columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self {
            category,
            columns,
            rows,
            as_of: String::new(),
            source: SourceLabel::Snapshot(category),
            completeness: Completeness::Complete,
        }
    }

    pub fn empty(category: DatasetCategory) -> Self {
        Self::new(category, Vec::new(), Vec::new())
    }

    pub fn with_source(mut self, source: SourceLabel, as_of: impl Into<String>) -> Self {
        self.source = source;
        self.as_of = as_of.into();
        self
    }

    pub fn with_completeness(mut self, completeness: Completeness) -> Self {
        self.completeness = completeness;
        self
    }

    pub fn category(&self) -> DatasetCategory {
        self.category
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn as_of(&self) -> &str {
        &self.as_of
    }

    pub fn source(&self) -> SourceLabel {
        self.source
    }

    pub fn completeness(&self) -> &Completeness {
        &self.completeness
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.completeness, Completeness::Partial { .. })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
