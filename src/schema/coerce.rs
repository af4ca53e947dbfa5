//! Locale-tolerant numeric coercion.
//!
//! Source values are integer-valued peso amounts or counts. Both `,` and `.`
//! appear as thousands separators depending on the export, so both are
//! stripped. A fractional field would be read as a larger integer.

use crate::models::Value;

/// Years at or below this are placeholders, not assignment years.
pub const SENTINEL_YEAR: i64 = 1900;

/// Parse a locale-formatted number such as `"1.234.567"` or `"$45,000"`.
///
/// Returns `None` for empty or unparseable input; never fails.
pub fn coerce_numeric(raw: Option<&str>) -> Option<f64> {
    let raw = raw?;
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '.' | '$') && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse an assignment year. Values `<= 1900` map to `None`.
pub fn coerce_year(raw: Option<&str>) -> Option<i64> {
    year_from(coerce_numeric(raw)?)
}

fn year_from(n: f64) -> Option<i64> {
    let year = n.trunc() as i64;
    (year > SENTINEL_YEAR).then_some(year)
}

/// Coerce a cell in place of [`coerce_numeric`]; numbers pass through.
pub fn coerce_value(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_finite() => Value::Number(*n),
        Value::Integer(i) => Value::Number(*i as f64),
        Value::Text(s) => coerce_numeric(Some(s)).map_or(Value::Missing, Value::Number),
        _ => Value::Missing,
    }
}

/// Coerce a cell in place of [`coerce_year`]; numbers pass through the same
/// sentinel check.
pub fn coerce_year_value(value: &Value) -> Value {
    let year = match value {
        Value::Integer(i) => (*i > SENTINEL_YEAR).then_some(*i),
        Value::Number(n) if n.is_finite() => year_from(*n),
        Value::Text(s) => coerce_year(Some(s)),
        _ => None,
    };
    year.map_or(Value::Missing, Value::Integer)
}
