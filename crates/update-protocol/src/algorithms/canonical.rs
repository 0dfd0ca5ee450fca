//! # Canonical Codec
//!
//! Deterministic JSON text for hashing and signing. Object keys are sorted,
//! there is no whitespace, strings use JSON escaping and numbers keep their
//! JSON rendering. Two values that differ only in key order canonicalize to
//! the same text.

use serde::Serialize;
use serde_json::Value;
use update_crypto::sha256_hex;

use crate::domain::errors::ProtocolResult;

/// Canonical text of a JSON value.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Canonical text of any serializable value.
pub fn canonicalize_serialize<T: Serialize>(value: &T) -> ProtocolResult<String> {
    Ok(canonicalize(&serde_json::to_value(value)?))
}

/// `sha256_hex(canonicalize(value))`.
pub fn canonical_hash(value: &Value) -> String {
    sha256_hex(canonicalize(value))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                if let Some(item) = map.get(key) {
                    write_canonical(item, out);
                }
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    // Serializing a &str cannot fail.
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => out.push_str("\"\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_sorted_keys_no_whitespace() {
        let value = json!({"b": 1, "a": [true, null, "x"], "c": {"z": 1.5, "y": -2}});
        assert_eq!(
            canonicalize(&value),
            r#"{"a":[true,null,"x"],"b":1,"c":{"y":-2,"z":1.5}}"#
        );
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(canonicalize(&json!("a\"b\n")), r#""a\"b\n""#);
        assert_eq!(canonicalize(&json!({"k\"": "v"})), r#"{"k\"":"v"}"#);
    }

    #[test]
    fn test_hash_is_stable_across_key_order() {
        let a = json!({"x": 1, "y": {"p": "q", "r": [1, 2]}});
        let b: Value = serde_json::from_str(r#"{"y":{"r":[1,2],"p":"q"},"x":1}"#).unwrap();
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    proptest! {
        #[test]
        fn prop_key_order_does_not_matter(entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..12)) {
            let forward: serde_json::Map<String, Value> =
                entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let reversed: serde_json::Map<String, Value> =
                entries.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();
            prop_assert_eq!(
                canonicalize(&Value::Object(forward)),
                canonicalize(&Value::Object(reversed))
            );
        }
    }
}
