//! Canonical serialization for deterministic model identity.
//!
//! Design and decision models are deduplicated and ordered by content
//! hash. The hash is computed over a canonical byte rendering so that
//! the same model always produces the same identity, across processes
//! and across sessions.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: struct fields serialize in declaration order
//! - Stable collection order: use `BTreeMap`/`BTreeSet` in hashed data
//! - Stable float format: f64 serializes consistently

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes for hashing.
///
/// Produces deterministic output for the same input, suitable for hash
/// computation and model deduplication.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("Canonical serialization failed")
}

/// Compute the canonical content hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    let bytes = to_canonical_bytes(value);
    xxh64(&bytes, 0)
}

/// Compute the canonical content hash and return it as a hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[derive(Serialize)]
    struct TestModel {
        category: String,
        elements: BTreeSet<String>,
    }

    #[test]
    fn test_determinism() {
        let m = TestModel {
            category: "TestModel".to_string(),
            elements: ["a", "b"].iter().map(|s| s.to_string()).collect(),
        };

        let h1 = canonical_hash(&m);
        let h2 = canonical_hash(&m);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_different_content_different_hash() {
        let m1 = TestModel {
            category: "TestModel".to_string(),
            elements: ["a"].iter().map(|s| s.to_string()).collect(),
        };
        let m2 = TestModel {
            category: "TestModel".to_string(),
            elements: ["b"].iter().map(|s| s.to_string()).collect(),
        };
        assert_ne!(canonical_hash(&m1), canonical_hash(&m2));
    }

    #[test]
    fn test_hex_width() {
        let m = TestModel {
            category: "TestModel".to_string(),
            elements: BTreeSet::new(),
        };
        assert_eq!(canonical_hash_hex(&m).len(), 16);
    }
}
