//! Canonical cache-key derivation.
//!
//! The cache key hashes the method name together with a canonical rendering of
//! the request parameters, so that semantically equivalent requests (same
//! params, different JSON object key order or whitespace) share one cache row.
//!
//! # Canonical form
//!
//! 1. Missing or `null` params are treated as the empty array.
//! 2. The value is normalised recursively:
//!    - objects become ordered sequences of `{"k": key, "v": value}` pairs
//!      sorted by key (lexicographic on the UTF-8 key bytes),
//!    - arrays keep their order with each element normalised,
//!    - scalars are left untouched. There is no numeric normalisation:
//!      `1` and `1.0` are distinct.
//! 3. The normalised value is serialised to compact JSON and hashed as
//!    `SHA-256(method || canonical_json)`, emitted as lowercase hex.
//!
//! The JSON-RPC `id` and the `jsonrpc` version string never participate in
//! the key: they are per-call, not per-query.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Derives the canonical cache key for a `(method, params)` pair.
///
/// Deterministic and pure: equal inputs (up to object key order) always yield
/// the same 64-character lowercase hex string.
///
/// # Errors
///
/// Returns an error if the normalised params cannot be serialised. Callers
/// treat a failed derivation as "uncacheable" and fall through to upstream.
pub fn derive_cache_key(method: &str, params: Option<&Value>) -> Result<String, serde_json::Error> {
    let normalized = params.map_or_else(|| Value::Array(Vec::new()), normalize);
    let canonical = serde_json::to_vec(&normalized)?;

    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// Recursively rewrites a JSON value into its canonical form.
///
/// Objects are turned into arrays of `{k, v}` pairs so that the canonical
/// serialisation is independent of map iteration order.
fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();

            Value::Array(
                keys.into_iter()
                    .map(|k| {
                        let mut pair = Map::new();
                        pair.insert("k".to_string(), Value::String(k.clone()));
                        pair.insert("v".to_string(), normalize(&map[k]));
                        Value::Object(pair)
                    })
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        scalar => scalar.clone(),
    }
}
