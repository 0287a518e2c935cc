//! Lenient numeric parsing for upstream fields that arrive either as numbers
//! or as display strings (`"$1,234.50"`, `"-0.82%"`).
//!
//! Anything unparseable becomes `0.0`. That fallback can hide a broken
//! upstream field behind a plausible-looking zero, so callers that need to
//! tell "missing" from "zero" should use [`parse_number_opt`] instead.

use serde_json::Value;

/// Parse a number-or-string field, treating unparseable input as `0.0`.
pub fn parse_number(value: &Value) -> f64 {
    parse_number_opt(value).unwrap_or(0.0)
}

/// Parse a number-or-string field, `None` when nothing numeric can be read.
pub fn parse_number_opt(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_display_number(s),
        _ => None,
    }
}

/// Strip currency, grouping and percent markers and read the leading number.
pub fn parse_display_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '₹' | ',' | '%') && !c.is_whitespace())
        .collect();

    // Mirror a lenient prefix read: "12.5abc" reads as 12.5.
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (idx, c) in cleaned.char_indices() {
        match c {
            '+' | '-' if idx == 0 => {}
            '.' if !seen_dot => seen_dot = true,
            d if d.is_ascii_digit() => seen_digit = true,
            _ => break,
        }
        end = idx + c.len_utf8();
    }

    if !seen_digit {
        return None;
    }

    cleaned[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Whether a JSON value would count as "present" in a `a || b || c` chain:
/// not null, not an empty string, not zero, not `false`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0 && !v.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// First truthy field among `keys` on `value`.
pub fn first_present<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find(|v| is_truthy(v))
}

/// First non-blank string field among `keys` on `value`.
pub fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Ticker symbols are compared trimmed and uppercased everywhere.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}
