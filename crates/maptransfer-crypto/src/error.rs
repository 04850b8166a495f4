//! Error types for the cryptographic primitives.

use thiserror::Error;

/// Failures from hashing, (de)compression, or signature verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// gzip decompression failed (truncated stream, bad header, ...).
    #[error("decompression failed: {0}")]
    DecompressFailed(String),

    /// A hex-encoded digest or key did not decode to the expected length.
    #[error("invalid digest encoding: {0}")]
    InvalidEncoding(String),

    /// ECDSA-P256 signature verification failed.
    #[error("signature verification failed")]
    InvalidSignature,

    /// A public key blob was malformed (wrong length, invalid curve point).
    #[error("invalid public key: {0}")]
    InvalidKey(String),
}
