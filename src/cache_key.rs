//! Stable cache identities for evaluated contract state.
//!
//! A key is the contract id plus a SHA-256 digest of the canonical JSON form of
//! the evaluation options. Canonical means object keys are sorted at every
//! nesting level, so two option sets that are equal by value always hash the
//! same no matter how they were built.

use crate::types::EvaluationOptions;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    subject_id: String,
    options_digest: String,
}

impl CacheKey {
    pub fn derive(subject_id: &str, options: &EvaluationOptions) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            options_digest: options_digest(options),
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn options_digest(&self) -> &str {
        &self.options_digest
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.subject_id, self.options_digest)
    }
}

/// Hex encoded SHA-256 of the canonical serialization of `options`.
pub fn options_digest(options: &EvaluationOptions) -> String {
    let canonical = canonical_json(&options.as_value());
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Compact JSON with object keys sorted recursively.
///
/// Does not rely on the map ordering of `serde_json::Map`, which changes when
/// the `preserve_order` feature is enabled anywhere in the dependency graph.
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, inner) in entries {
                sorted.insert(key.clone(), canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_independent_of_insertion_order() {
        let a = EvaluationOptions::new()
            .with("sourceType", "arweave")
            .with("maxCallDepth", 5)
            .with("nested", json!({ "b": 1, "a": [ { "z": 1, "y": 2 } ] }));
        let b = EvaluationOptions::new()
            .with("nested", json!({ "a": [ { "y": 2, "z": 1 } ], "b": 1 }))
            .with("maxCallDepth", 5)
            .with("sourceType", "arweave");

        assert_eq!(CacheKey::derive("contract", &a), CacheKey::derive("contract", &b));
        assert_eq!(
            CacheKey::derive("contract", &a).to_string(),
            CacheKey::derive("contract", &b).to_string()
        );
    }

    #[test]
    fn test_distinct_inputs_yield_distinct_keys() {
        let a = EvaluationOptions::new().with("maxCallDepth", 5);
        let b = EvaluationOptions::new().with("maxCallDepth", 6);

        assert_ne!(CacheKey::derive("contract", &a), CacheKey::derive("contract", &b));
        assert_ne!(CacheKey::derive("one", &a), CacheKey::derive("two", &a));
    }

    #[test]
    fn test_digest_of_empty_options() {
        // sha256("{}")
        assert_eq!(
            options_digest(&EvaluationOptions::new()),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn test_display_format() {
        let key = CacheKey::derive("abc", &EvaluationOptions::new());
        assert!(key.to_string().starts_with("abc-"));
        assert_eq!(key.options_digest().len(), 64);
        assert_eq!(key.subject_id(), "abc");
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({ "b": { "d": 1, "c": 2 }, "a": true });
        assert_eq!(canonical_json(&value), r#"{"a":true,"b":{"c":2,"d":1}}"#);
    }
}
