//! Errors surfaced while decoding frames off the transport.

use thiserror::Error;

/// Failures that can occur turning a raw per-write buffer into a [`crate::Frame`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The buffer exceeded the negotiated per-write maximum before any
    /// parsing was attempted.
    #[error("frame of {size} bytes exceeds the {max}-byte per-write limit")]
    FrameTooLarge {
        /// Size of the offending buffer.
        size: usize,
        /// Configured per-write maximum.
        max: usize,
    },

    /// The buffer was not valid UTF-8 JSON, or was JSON but did not match
    /// any known frame shape.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame's `type` tag was not one of the known wire frame kinds.
    #[error("unknown frame type: {0}")]
    UnknownType(String),

    /// A `chunk_data` frame's `data` field was not strict lowercase hex.
    #[error("invalid hex encoding in chunk payload")]
    InvalidEncoding,

    /// A `chunk_data` frame carried a `checksum` that did not match the
    /// checksum recomputed over the decoded payload.
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

impl WireError {
    /// Whether a sender can reasonably retry after this error.
    ///
    /// Every wire-level error here is a bad frame — dropping it and letting
    /// the sender retry (per §7's "advisory" surfacing) is always safe to
    /// consider.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        true
    }
}
