//! Cryptographic primitives for the map transfer protocol.
//!
//! Pure functions with deterministic outputs (aside from key generation,
//! which is exercised only in tests). Callers own all key material and
//! randomness; nothing here touches the filesystem or a clock.
//!
//! # Components
//!
//! - [`hash`]: SHA-256 wire/canonical integrity hashing (§4.4).
//! - [`checksum`]: CRC-32 per-chunk checksum (§3).
//! - [`compression`]: gzip decompression of the optional compressed wire
//!   form (§4.4 step 3).
//! - [`signature`]: ECDSA-P256 verification for production auth, plus a
//!   keyed-digest stand-in for development (§4.2).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod checksum;
pub mod compression;
pub mod error;
pub mod hash;
pub mod signature;

pub use checksum::checksum_hex;
pub use compression::gzip_decompress;
pub use error::CryptoError;
pub use hash::{hashes_match, sha256_hex};
pub use signature::{keyed_digest_hex, verify_ecdsa_p256, verify_keyed_digest};
