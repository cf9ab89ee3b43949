//! Hash Utilities for Replay Fingerprints
//!
//! Replays are deterministic: the same configuration and request stream
//! must produce byte-identical audit trails. A SHA-256 over the serialized
//! records makes two runs comparable at a glance.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hash a sequence of serializable records.
///
/// Each record is serialized as compact JSON and terminated by a newline
/// before being fed to the hasher.
pub fn fingerprint<T: Serialize>(records: &[T]) -> Result<[u8; 32], serde_json::Error> {
    let mut hasher = Sha256::new();
    for record in records {
        let bytes = serde_json::to_vec(record)?;
        hasher.update(&bytes);
        hasher.update(b"\n");
    }
    let result = hasher.finalize();

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    Ok(hash)
}

/// Convert hash to hex string for display
pub fn hash_to_hex(hash: &[u8; 32]) -> String {
    hash.iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
