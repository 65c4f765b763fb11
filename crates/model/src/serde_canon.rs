//! Canonical JSON serialization for deterministic artifact hashing
//!
//! Object keys are sorted recursively and output is compact, so two
//! artifacts that differ only in key order or whitespace hash identically.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanonicalError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Serialize a value to canonical JSON (sorted keys, no whitespace)
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let canonical = canonicalize(serde_json::to_value(value)?);
    Ok(serde_json::to_string(&canonical)?)
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Blake3 hash of the canonical JSON form, hex encoded
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let json = to_canonical_json(value)?;
    Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        b_field: i64,
        a_field: i64,
        z_field: Vec<&'static str>,
    }

    fn sample() -> Sample {
        Sample {
            b_field: 2,
            a_field: 1,
            z_field: vec!["x", "y"],
        }
    }

    #[test]
    fn test_keys_sorted_and_compact() {
        let json = to_canonical_json(&sample()).unwrap();
        assert_eq!(json, r#"{"a_field":1,"b_field":2,"z_field":["x","y"]}"#);
    }

    #[test]
    fn test_hash_ignores_key_order() {
        let reordered: Value =
            serde_json::from_str(r#"{ "z_field": ["x", "y"], "b_field": 2, "a_field": 1 }"#)
                .unwrap();

        let hash1 = hash_canonical_hex(&sample()).unwrap();
        let hash2 = hash_canonical_hex(&reordered).unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }
}
