//! Hashing System - SHA-256 for fingerprints and manifests
//!
//! Fingerprints must be stable across machines and runs: they are derived
//! from artifact bytes only.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Content fingerprint used in output file names: the first `len` hex
/// characters of the SHA-256 digest.
pub fn content_hash(data: &[u8], len: usize) -> String {
    let mut hex = sha256_hex(data);
    hex.truncate(len.min(64));
    hex
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    let sorted = sort_value(&v);
    to_string(&sorted)
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let sorted_map: serde_json::Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            Value::Object(sorted_map)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Digest of a serializable manifest, independent of key order.
pub fn compute_manifest_hash<T: Serialize>(manifest: &T) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(manifest)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": 2, "m": 3});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_content_hash_length_and_distinctness() {
        let a = content_hash(b"body{}", 20);
        let b = content_hash(b"body{ }", 20);
        assert_eq!(a.len(), 20);
        assert_ne!(a, b);
        assert_eq!(a, content_hash(b"body{}", 20));
        assert_eq!(content_hash(b"x", 100).len(), 64);
    }

    #[test]
    fn test_manifest_hash_ignores_key_order() {
        let h1 = compute_manifest_hash(&json!({"index.js": "aa", "index.css": "bb"})).unwrap();
        let h2 = compute_manifest_hash(&json!({"index.css": "bb", "index.js": "aa"})).unwrap();
        assert_eq!(h1, h2);
    }
}
