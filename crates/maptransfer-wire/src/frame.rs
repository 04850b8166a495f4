//! Wire frame shapes for the auth, data, and status channels (§6).
//!
//! Frames are JSON objects tagged by a `type` field; unknown fields are
//! ignored by `serde`'s default struct deserialization and unknown `type`
//! values are rejected by the enum's tagged-dispatch deserializer. This is
//! the "tagged-variant enumeration with exhaustive matching" redesign from
//! §9 — there is no string-keyed dispatch anywhere past the initial parse.

use serde::{Deserialize, Serialize};

use crate::session_id::SessionId;

/// How the wire payload relates to the canonical (to-be-installed) bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Wire bytes are the canonical bytes.
    #[default]
    None,
    /// Wire bytes are a gzip stream whose decompression is the canonical
    /// bytes.
    Gzip,
}

/// Metadata describing the map about to be transferred (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    /// Size in bytes of the canonical (post-decompression) payload.
    pub file_size: u64,
    /// Hex-encoded SHA-256 of the canonical payload.
    pub file_hash: String,
    /// Strictly positive, monotonically increasing version number.
    pub version: u64,
    /// Optional signature over an implementation-defined binding of the
    /// metadata, required iff policy demands (`auth.required_signature`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Compression applied to the wire payload.
    #[serde(default)]
    pub compression: Compression,
    /// Size in bytes of the wire (possibly compressed) payload. Required
    /// when `compression != none`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<u64>,
    /// Hex-encoded SHA-256 of the wire payload. Required when
    /// `compression != none`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_hash: Option<String>,
}

/// Capabilities advertised to an authenticated client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Maximum accepted wire size, in bytes.
    pub max_transfer_size: u64,
    /// Negotiated chunk size, in bytes.
    pub chunk_size: u32,
    /// Supported compression modes, e.g. `["none", "gzip"]`.
    pub compression: Vec<String>,
    /// Whether `pause`/`resume` is supported.
    pub resume: bool,
}

/// `transfer_control` command names (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    /// Suspend chunk acceptance; legal only from `Receiving`.
    Pause,
    /// Resume chunk acceptance; returns the missing set.
    Resume,
    /// Abort the session; legal from any non-terminal state.
    Cancel,
    /// Request a progress snapshot without changing state.
    Status,
}

/// A single wire frame on the auth, data, or status channel.
///
/// Encoding is `serde_json` with the variant name as the `type` tag; see
/// each variant's doc comment for the corresponding §6 frame shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client requests authentication.
    AuthRequest {
        /// Identifier of the connecting enforcement terminal.
        client_id: String,
    },
    /// Server's challenge in response to an `auth_request`.
    AuthChallenge {
        /// Newly minted session identifier.
        session_id: SessionId,
        /// Hex-encoded 128-bit nonce.
        nonce: String,
        /// Unix timestamp (seconds) the challenge was issued.
        timestamp: u64,
        /// Hex-encoded SHA-256 binding payload the client must sign.
        payload_hash: String,
    },
    /// Client's signed response to a challenge.
    AuthResponse {
        /// Session identifier from the matching `auth_challenge`.
        session_id: SessionId,
        /// Hex-encoded signature (or keyed digest in development mode)
        /// over the challenge's binding payload.
        signature: String,
    },
    /// Server confirms successful authentication.
    AuthSuccess {
        /// The now-authenticated session's identifier.
        session_id: SessionId,
        /// Capabilities available for the remainder of the session.
        server_capabilities: ServerCapabilities,
    },
    /// Server rejects an authentication attempt.
    AuthError {
        /// Stable error code (see §7).
        code: String,
        /// Human-readable detail.
        message: String,
    },
    /// Client announces an incoming transfer.
    TransferInit {
        /// Metadata describing the map to be transferred.
        metadata: TransferMetadata,
    },
    /// Server accepts a `transfer_init` and is ready for chunks.
    TransferReady {
        /// Authenticated session this transfer belongs to.
        session_id: SessionId,
        /// Negotiated chunk size, in bytes.
        chunk_size: u32,
        /// Total number of chunks expected.
        total_chunks: u32,
        /// Expected canonical-payload hash (echoes `metadata.file_hash`).
        expected_hash: String,
    },
    /// One chunk of the wire payload.
    ChunkData {
        /// Session this chunk belongs to.
        session_id: SessionId,
        /// Zero-based index of this chunk.
        chunk_index: u32,
        /// Hex-encoded chunk payload bytes.
        data: String,
        /// Optional checksum over the decoded payload bytes.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum: Option<String>,
    },
    /// Server's acknowledgment of an accepted chunk.
    ChunkAck {
        /// Index of the chunk just accepted.
        chunk_index: u32,
        /// Total distinct chunks accepted so far.
        chunks_received: u32,
        /// Total chunks expected.
        total_chunks: u32,
        /// Fraction complete in `[0.0, 1.0]`.
        progress: f64,
        /// Up to 10 missing indices, for sender-side diagnostics.
        missing_sample: Vec<u32>,
    },
    /// Client requests a control action on the active transfer.
    TransferControl {
        /// The requested action.
        command: ControlCommand,
    },
    /// Server reports successful completion.
    TransferComplete {
        /// The completed session's identifier.
        session_id: SessionId,
        /// Canonical payload hash (matches `metadata.file_hash`).
        file_hash: String,
        /// Canonical payload size, in bytes.
        file_size: u64,
        /// Wall-clock duration of the transfer, in seconds.
        duration: f64,
        /// Version now installed.
        new_version: u64,
    },
    /// Server reports a terminal transfer failure.
    TransferError {
        /// Stable error code (see §7).
        code: String,
        /// Human-readable detail.
        message: String,
        /// Whether the sender may reasonably retry the whole transfer.
        retry_suggested: bool,
    },
}
