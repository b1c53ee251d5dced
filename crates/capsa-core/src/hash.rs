//! Content hashing for content-addressed storage.
//!
//! Every blob Capsa stores is keyed by the hex digest of its SHA-256 hash,
//! so identical bytes always land on the same key.

use sha2::{Digest, Sha256};

/// Returns the hex digest of the SHA-256 hash of `bytes`.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
