//! Request-payload fingerprints.
//!
//! A fingerprint is a SHA-256 digest of the canonicalized payload, used to
//! detect the same idempotency key being reused for a *different* payload.
//! Canonical form: object entries whose value is JSON `null` are dropped
//! (recursively), so an explicitly-null field and an absent field hash
//! identically; the remaining value is serialized with ordered object keys.
//!
//! Every fingerprint carries an algorithm-version prefix and is compared as
//! an opaque string. Changing the canonicalization ships as a new version
//! rather than invalidating stored hashes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Version prefix of the current fingerprint algorithm.
const VERSION: &str = "v1";

/// A fixed-length, version-prefixed hash of a canonicalized request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
  /// Compute the fingerprint of `payload`.
  pub fn compute(payload: &Value) -> Self {
    let canonical = canonicalize(payload);

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    let hash = hasher.finalize();

    Self(format!("{VERSION}:{}", hex::encode(hash)))
  }

  /// Rehydrate a fingerprint read back from storage, verbatim.
  pub fn from_stored(s: impl Into<String>) -> Self { Self(s.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// Drop null-valued object entries, recursively. Array elements are kept
/// as-is: `null` inside an array is positional data, not an absent field.
fn canonicalize(value: &Value) -> Value {
  match value {
    Value::Object(map) => Value::Object(
      map
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), canonicalize(v)))
        .collect(),
    ),
    Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
    other => other.clone(),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn identical_payloads_match() {
    let a = json!({"email": "a@b.com", "plan": "pro"});
    let b = json!({"email": "a@b.com", "plan": "pro"});
    assert_eq!(Fingerprint::compute(&a), Fingerprint::compute(&b));
  }

  #[test]
  fn different_payloads_differ() {
    let a = json!({"email": "a@b.com"});
    let b = json!({"email": "x@y.com"});
    assert_ne!(Fingerprint::compute(&a), Fingerprint::compute(&b));
  }

  #[test]
  fn explicit_null_equals_absent_field() {
    let a = json!({"email": "a@b.com", "referrer": null});
    let b = json!({"email": "a@b.com"});
    assert_eq!(Fingerprint::compute(&a), Fingerprint::compute(&b));
  }

  #[test]
  fn nested_nulls_are_dropped_too() {
    let a = json!({"profile": {"name": "A", "bio": null}});
    let b = json!({"profile": {"name": "A"}});
    assert_eq!(Fingerprint::compute(&a), Fingerprint::compute(&b));
  }

  #[test]
  fn null_inside_an_array_is_significant() {
    let a = json!({"scores": [1, null, 3]});
    let b = json!({"scores": [1, 3]});
    assert_ne!(Fingerprint::compute(&a), Fingerprint::compute(&b));
  }

  #[test]
  fn fingerprints_are_version_prefixed() {
    let fp = Fingerprint::compute(&json!({}));
    assert!(fp.as_str().starts_with("v1:"));
    // SHA-256 hex digest after the prefix.
    assert_eq!(fp.as_str().len(), "v1:".len() + 64);
  }
}
