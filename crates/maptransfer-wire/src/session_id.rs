//! 128-bit session identifiers, wire-encoded as lowercase hex strings.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A server-minted, process-lifetime-unique session identifier.
///
/// Wire representation is a 32-character lowercase hex string (see §6's
/// `auth_challenge`/`transfer_ready` frames). Internally it is a plain
/// `u128` so comparisons and generation are cheap; only the serde impls
/// care about the hex encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u128);

impl SessionId {
    /// Build a session id from raw bytes produced by a random source.
    ///
    /// `bytes` must be exactly 16 bytes; this is an internal construction
    /// helper, not a wire parser, so it panics on misuse rather than
    /// returning a `Result` — callers always pass a fixed-size buffer.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }

    /// The raw 128-bit value.
    #[must_use]
    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Error returned when parsing a `SessionId` from an untrusted wire string.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid session id: {0}")]
pub struct SessionIdParseError(String);

impl std::str::FromStr for SessionId {
    type Err = SessionIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(SessionIdParseError(format!("expected 32 hex chars, got {}", s.len())));
        }
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| SessionIdParseError(e.to_string()))?;
        Ok(Self::from_bytes(bytes))
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
