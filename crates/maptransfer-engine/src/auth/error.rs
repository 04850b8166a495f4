//! Error classification for the auth handshake (§4.2, §7).

use thiserror::Error;

/// Failures from [`super::engine::AuthEngine::process`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// A data-channel frame arrived before authentication completed.
    #[error("authentication required")]
    AuthRequired,

    /// Challenge response rejected: wrong session id, exhausted attempts,
    /// or (dev-mode) digest mismatch.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The challenge response arrived after `auth.window_seconds`.
    #[error("authentication challenge expired")]
    AuthExpired,

    /// ECDSA-P256 signature did not verify, or an empty signature was
    /// supplied while `required_signature = true`.
    #[error("invalid signature")]
    InvalidSignature,

    /// `auth_response` referenced a session id with no outstanding
    /// challenge (expired, already consumed, or never issued).
    #[error("no active challenge for this session")]
    NoActiveChallenge,
}

impl AuthError {
    /// Stable wire error code (§7).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthRequired => "AuthRequired",
            Self::AuthFailed(_) => "AuthFailed",
            Self::AuthExpired => "AuthExpired",
            Self::InvalidSignature => "InvalidSignature",
            Self::NoActiveChallenge => "AuthFailed",
        }
    }

    /// Whether the caller may simply retry the handshake (issue a fresh
    /// challenge) rather than treat this as a fatal session error.
    ///
    /// Per §7, all auth failures "reset auth" rather than terminating the
    /// whole transfer session — so every variant here is locally
    /// recoverable by the coordinator re-issuing a challenge.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        true
    }
}
