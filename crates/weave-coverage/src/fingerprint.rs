//! State fingerprinting (`spec.md` §4.7).
//!
//! A fingerprint is the SHA-256 hex digest of the store's full state
//! rendered as canonical JSON: object keys sorted, no extraneous
//! whitespace. Two runs that reach the same fingerprint reached the same
//! observable state, regardless of how they got there.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use weave_types::{Row, Value};

/// Computes the canonical-JSON SHA-256 fingerprint of a full state
/// snapshot, keyed by `"<component>.<table>"` in sorted order so table
/// iteration order never affects the digest.
pub fn compute_state_fingerprint(state: &HashMap<(String, String), Vec<Row>>) -> String {
    let mut keys: Vec<&(String, String)> = state.keys().collect();
    keys.sort();

    let mut obj = serde_json::Map::new();
    for key in keys {
        let rows = &state[key];
        let json_rows: Vec<serde_json::Value> =
            rows.iter().map(|row| Value::Map(row.clone()).to_canonical_json()).collect();
        obj.insert(format!("{}.{}", key.0, key.1), serde_json::Value::Array(json_rows));
    }

    let canonical = serde_json::to_string(&serde_json::Value::Object(obj))
        .expect("a canonical JSON object of plain values never fails to serialize");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}
