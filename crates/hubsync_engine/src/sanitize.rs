//! Value coercion for raw source fields.
//!
//! Every helper maps malformed input to `None` instead of failing: a bad
//! scalar costs one column, never the record or the batch.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Coerces a scalar to a non-empty string.
///
/// Numbers and booleans are rendered; null, empty strings, arrays and
/// objects are absent.
pub fn safe_str(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Coerces a scalar to a finite float.
///
/// Strings are trimmed before parsing. Anything non-numeric is absent.
pub fn safe_float(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Coerces a scalar to an integer, accepting integral floats.
pub fn safe_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Reads a boolean flag; anything but `true`/`"true"` is false.
pub fn safe_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Coerces a native id to its canonical string form.
///
/// Integral numbers render without a fractional part, strings are trimmed,
/// and an id that ends up empty is absent.
pub fn canonical_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => match (n.as_u64(), n.as_i64()) {
            (Some(u), _) => u.to_string(),
            (None, Some(i)) => i.to_string(),
            _ => n.to_string(),
        },
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

/// Parses an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with an offset, or a naive date-time which is taken to
/// be UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Reads a timestamp field: an ISO string or epoch milliseconds.
pub fn timestamp_value(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => parse_timestamp(s).or_else(|| {
            s.trim()
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis)
        }),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Truncates a timestamp string to its calendar date.
///
/// Only the leading `YYYY-MM-DD` is considered; anything shorter or not a
/// valid date is absent.
pub fn truncate_date(value: Option<&Value>) -> Option<NaiveDate> {
    let raw = value?.as_str()?;
    let prefix = raw.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}
