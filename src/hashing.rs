//! Hashing System - SHA-256 Document Fingerprints
//!
//! Reports carry the digest of the exact bytes that were checked, so two
//! runs over an unchanged file can be compared directly.

use sha2::{Sha256, Digest};
use serde::Serialize;
use serde_json::{Value, to_string};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace).
/// Going through `Value` sorts keys: its map is ordered by key.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&v)
}

/// Digest of a report's check outcomes, independent of key order.
pub fn compute_outcome_hash<T: Serialize>(outcome: &T) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(outcome)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}
