//! Canonical JSON serialization for anything that gets signed: certificates,
//! policies, commitment payloads, negotiation round payloads. Signature
//! verification breaks under field-order or whitespace drift, so this is
//! deliberately not `serde_json::to_string` — object keys are sorted
//! recursively, there is no whitespace, and `null`-valued fields (the
//! wire shape of a Rust `Option::None`) are dropped rather than emitted.

use serde::Serialize;
use serde_json::Value;

use crate::error::AespError;

/// Serialize `value` to its canonical JSON string.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, AespError> {
    let raw = serde_json::to_value(value).map_err(|e| AespError::Serialization(e.to_string()))?;
    let canonical = canonicalize(raw);
    serde_json::to_string(&canonical).map_err(|e| AespError::Serialization(e.to_string()))
}

/// Serialize `value` to the raw canonical bytes (what gets hashed/signed).
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, AespError> {
    Ok(to_canonical_json(value)?.into_bytes())
}

/// Recursively sort object keys and drop `null` fields. Arrays keep their
/// order (order is significant data, not incidental serialization layout).
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> =
                std::collections::BTreeMap::new();
            for (k, v) in map {
                if v.is_null() {
                    continue;
                }
                sorted.insert(k, canonicalize(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
