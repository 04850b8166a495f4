//! SHA-256 hashing for wire and canonical integrity checks (§4.4).

use sha2::{Digest, Sha256};

/// SHA-256 of `bytes`, returned as a lowercase hex string.
///
/// Used for both the wire hash (over whatever actually crossed the link)
/// and the canonical hash (over the decompressed payload) — §4.4 steps 2
/// and 4 compare this output against `file_hash`/`compressed_hash`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Constant-time-irrelevant equality check against an expected lowercase
/// hex digest.
///
/// Digest comparison here is not a secret-dependent branch (both values are
/// already known to the peer that sent them), so a plain comparison is
/// appropriate — unlike the signature check in [`crate::signature`].
#[must_use]
pub fn hashes_match(computed: &str, expected: &str) -> bool {
    computed.eq_ignore_ascii_case(expected)
}
