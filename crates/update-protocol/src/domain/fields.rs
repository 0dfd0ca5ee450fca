//! Lenient field readers for untyped JSON input.
//!
//! Payloads arrive from many producers, so numbers may be strings, flags may
//! be `"yes"` and fields may use camelCase aliases. These readers absorb that
//! so the typed parsers stay flat.

use serde_json::{Map, Value};

use super::errors::{ProtocolError, ProtocolResult};
use super::value_objects::MAX_SEQUENCE;

/// JSON object alias.
pub type Object = Map<String, Value>;

/// View a value as an object.
pub fn as_object(value: &Value) -> Option<&Object> {
    value.as_object()
}

/// First non-null value among `keys`.
pub fn first<'a>(obj: &'a Object, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| !value.is_null())
}

/// Render scalars as text. Objects, arrays and null yield `None`.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Trimmed text of the first key (in order) whose value is a non-empty scalar.
pub fn text(obj: &Object, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .filter_map(as_text)
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

/// Trimmed text of the first non-null key only, empty treated as absent.
pub fn text_strict(obj: &Object, keys: &[&str]) -> Option<String> {
    first(obj, keys)
        .and_then(as_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Numbers and numeric strings.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// First non-null key read as a number.
pub fn number(obj: &Object, keys: &[&str]) -> Option<f64> {
    first(obj, keys).and_then(as_number)
}

/// First non-null key truncated to a non-negative integer.
pub fn uint(obj: &Object, keys: &[&str]) -> Option<u64> {
    number(obj, keys).map(truncate_u64)
}

/// Chain sequence of the first non-null key.
///
/// Unlike [`uint`] nothing is truncated or clamped: a value that is not a
/// whole number in `0..=MAX_SEQUENCE` is an error. Blank text counts as absent.
pub fn sequence(obj: &Object, keys: &[&str]) -> ProtocolResult<Option<u64>> {
    let exact = match first(obj, keys) {
        None => return Ok(None),
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().and_then(whole)),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| s.parse::<f64>().ok().and_then(whole))
        }
        Some(_) => None,
    };
    exact
        .filter(|n| *n <= MAX_SEQUENCE)
        .map(Some)
        .ok_or(ProtocolError::InvalidSequence)
}

fn whole(value: f64) -> Option<u64> {
    let exact = value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= MAX_SEQUENCE as f64;
    exact.then(|| value as u64)
}

/// Truncate towards zero and clamp at zero.
pub fn truncate_u64(value: f64) -> u64 {
    if value <= 0.0 {
        0
    } else {
        value.trunc() as u64
    }
}

/// Booleans, non-zero numbers and the usual textual spellings.
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// First non-null key read as a flag.
pub fn flag(obj: &Object, keys: &[&str]) -> Option<bool> {
    first(obj, keys).and_then(as_bool)
}

/// Non-empty trimmed strings of an array.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(as_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Parse a string holding a JSON object, or take an object as is.
pub fn object_or_json_text(value: &Value) -> Option<Object> {
    match value {
        Value::Object(obj) => Some(obj.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(obj)) => Some(obj),
            _ => None,
        },
        _ => None,
    }
}
