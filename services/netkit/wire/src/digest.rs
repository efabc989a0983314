//! Keyed SHA-256 digest over the canonical packet document.
//!
//! The digest is `SHA256(canonical_json || key)` rendered as 64 lowercase hex
//! characters, where `canonical_json` is the compact JSON of the document with
//! the digest member removed. Member order is taken from the document itself,
//! so a receiver re-serializing what it parsed hashes the same bytes the
//! sender did.

use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::packet::DIGEST_FIELD;

/// Length of a hex-encoded digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Compute the keyed digest of a packet document.
///
/// Any digest member already present in `document` is ignored.
pub fn generate_digest(key: &str, document: &Value) -> String {
    let canonical = match document {
        Value::Object(map) if map.contains_key(DIGEST_FIELD) => {
            let mut stripped = map.clone();
            stripped.shift_remove(DIGEST_FIELD);
            Value::Object(stripped).to_string()
        }
        other => other.to_string(),
    };

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute the digest of `document` and compare it with `claimed`.
pub fn verify_digest(key: &str, document: &Value, claimed: &str) -> bool {
    let expected = generate_digest(key, document);
    expected.as_bytes().ct_eq(claimed.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_digest_is_lowercase_hex() {
        let doc = json!({"h": 1, "b": {"cmd": "ping"}, "r_id": 42});
        let digest = generate_digest("secret", &doc);

        assert_eq!(digest.len(), DIGEST_HEX_LEN);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_digest_ignores_existing_hash_member() {
        let bare = json!({"h": 1, "b": {}, "r_id": 7});
        let with_hash = json!({"h": 1, "b": {}, "r_id": 7, "hash": "deadbeef"});

        assert_eq!(
            generate_digest("k", &bare),
            generate_digest("k", &with_hash)
        );
    }

    #[test]
    fn test_digest_matches_manual_construction() {
        let doc = json!({"h": 1, "b": {"cmd": "ping"}, "r_id": 42});
        let manual = hex::encode(Sha256::digest(
            br#"{"h":1,"b":{"cmd":"ping"},"r_id":42}secret"#,
        ));

        assert_eq!(generate_digest("secret", &doc), manual);
    }

    #[test]
    fn test_digest_depends_on_key() {
        let doc = json!({"h": 3, "b": {"a": 1}, "r_id": 0});
        assert_ne!(generate_digest("one", &doc), generate_digest("two", &doc));
    }

    #[test]
    fn test_verify_digest() {
        let doc = json!({"h": 9, "b": {"n": [1, 2, 3]}, "r_id": 11});
        let digest = generate_digest("key", &doc);

        assert!(verify_digest("key", &doc, &digest));
        assert!(!verify_digest("other", &doc, &digest));
        assert!(!verify_digest("key", &doc, &digest[..10]));
        assert!(!verify_digest("key", &doc, &digest.to_uppercase()));
    }
}
