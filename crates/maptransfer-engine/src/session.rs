//! Transfer session state machine (C3, §3, §4.3).

use std::collections::BTreeMap;
use std::time::Duration;

use maptransfer_wire::{Compression, SessionId, TransferMetadata};
use thiserror::Error;

use crate::env::Environment;

/// Default negotiated chunk length, in bytes (§6 `chunk_size`).
pub const DEFAULT_CHUNK_SIZE: u32 = 128;
/// Default maximum accepted wire size (§6 `max_transfer_size`).
pub const DEFAULT_MAX_TRANSFER_SIZE: u64 = 5 * 1024 * 1024;
/// Default acceptance rate cap (§6 `max_chunks_per_second`).
pub const DEFAULT_MAX_CHUNKS_PER_SECOND: u32 = 10;
/// Default session liveness timeout (§6 `session_timeout_seconds`).
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(600);

/// States of the authoritative state machine (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transfer in progress.
    Idle,
    /// `transfer_init` accepted; waiting for the first chunk.
    MetadataAccepted,
    /// At least one chunk accepted; more expected.
    Receiving,
    /// Receiving suspended by `transfer_control{command:"pause"}`.
    Paused,
    /// All chunks received; running the wire/canonical hash checks.
    Validating,
    /// Running gzip decode after a successful wire-hash check.
    Decompressing,
    /// Handing canonical bytes to the atomic store.
    Committing,
    /// Terminal: installed successfully.
    Completed,
    /// Terminal: a fatal error occurred.
    Failed,
    /// Terminal: cancelled by the client or by timeout.
    Cancelled,
}

impl SessionState {
    /// Terminal states are not mutated further except by cleanup.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Tunable acceptance policy (§6).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Negotiated chunk length.
    pub chunk_size: u32,
    /// Reject `transfer_init` whose wire size exceeds this.
    pub max_transfer_size: u64,
    /// Acceptance rate cap, in chunks per second.
    pub max_chunks_per_second: u32,
    /// Liveness timeout since last activity.
    pub session_timeout: Duration,
    /// Whether `transfer_init` must carry a signature.
    pub require_signature: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_transfer_size: DEFAULT_MAX_TRANSFER_SIZE,
            max_chunks_per_second: DEFAULT_MAX_CHUNKS_PER_SECOND,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            require_signature: true,
        }
    }
}

/// Failures from the C3 public contract (§4.3, §7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// `start` called while a non-terminal session already exists.
    #[error("a transfer is already active")]
    TransferAlreadyActive,
    /// `transfer_init` metadata failed structural validation.
    #[error("invalid transfer metadata: {0}")]
    InvalidMetadata(String),
    /// Wire size exceeds `max_transfer_size`.
    #[error("file too large: {size} bytes exceeds maximum {max}")]
    FileTooLarge {
        /// Size that was rejected.
        size: u64,
        /// Configured maximum.
        max: u64,
    },
    /// `metadata.version` does not exceed the installed version.
    #[error("version {version} is not newer than installed version {installed}")]
    VersionTooOld {
        /// Offered version.
        version: u64,
        /// Currently installed version.
        installed: u64,
    },
    /// Policy requires a signature but none was supplied.
    #[error("signature required but not supplied")]
    MissingSignature,
    /// A data-channel frame arrived with no session in progress.
    #[error("no active transfer")]
    NoActiveTransfer,
    /// The requested operation is not legal in the current state.
    #[error("invalid state for this operation")]
    InvalidState,
    /// Frame referenced a session id other than the active one.
    #[error("session id does not match the active session")]
    SessionMismatch,
    /// `chunk_index >= total_chunks`.
    #[error("chunk index {index} out of range (total {total})")]
    ChunkOutOfRange {
        /// Index supplied.
        index: u32,
        /// Total chunk count.
        total: u32,
    },
    /// Payload length did not match the expected length for this index.
    #[error("expected chunk length {expected}, got {actual}")]
    WrongChunkLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
    /// Chunk payload failed hex decoding upstream.
    #[error("invalid chunk encoding")]
    InvalidEncoding,
    /// Per-chunk checksum did not match the decoded payload.
    #[error("chunk checksum mismatch")]
    ChecksumMismatch,
    /// Session exceeded `session_timeout` with no activity.
    #[error("session timed out")]
    Timeout,
    /// Session cancelled by the client.
    #[error("cancelled by user")]
    CancelledByUser,
}

impl SessionError {
    /// Stable wire error code (§7).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransferAlreadyActive => "TransferAlreadyActive",
            Self::InvalidMetadata(_) => "InvalidMetadata",
            Self::FileTooLarge { .. } => "FileTooLarge",
            Self::VersionTooOld { .. } => "VersionTooOld",
            Self::MissingSignature => "MissingSignature",
            Self::NoActiveTransfer => "NoActiveTransfer",
            Self::InvalidState => "InvalidState",
            Self::SessionMismatch => "SessionMismatch",
            Self::ChunkOutOfRange { .. } => "ChunkOutOfRange",
            Self::WrongChunkLength { .. } => "WrongChunkLength",
            Self::InvalidEncoding => "InvalidEncoding",
            Self::ChecksumMismatch => "ChecksumMismatch",
            Self::Timeout => "Timeout",
            Self::CancelledByUser => "CancelledByUser",
        }
    }

    /// Whether the session survives this error (§7 "drop frame" rows) or
    /// the error is terminal for the session.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Timeout | Self::CancelledByUser)
    }
}

/// Result of a successful `start` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    /// The session id the client must echo on every subsequent frame.
    pub session_id: SessionId,
    /// Negotiated chunk length.
    pub chunk_size: u32,
    /// Total chunk count for this wire size.
    pub total_chunks: u32,
    /// Hash the client should expect back on completion.
    pub expected_hash: String,
}

/// Result of a successful `receive_chunk` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Chunk accepted; more are expected.
    Ack {
        /// Count of distinct chunks received so far.
        chunks_received: u32,
        /// Total chunk count.
        total_chunks: u32,
        /// `chunks_received / total_chunks`, in `[0.0, 1.0]`.
        progress: f64,
    },
    /// Chunk already present; table unchanged.
    Duplicate {
        /// Count of distinct chunks received so far.
        chunks_received: u32,
        /// Total chunk count.
        total_chunks: u32,
        /// `chunks_received / total_chunks`, in `[0.0, 1.0]`.
        progress: f64,
    },
    /// All chunks received; ready for the integrity pipeline. The session
    /// has moved to `Validating`; the caller owns the assembled buffer.
    Complete {
        /// Wire bytes in index order.
        assembled: Vec<u8>,
    },
}

/// Point-in-time progress snapshot for `status()`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    /// Current state.
    pub state: SessionState,
    /// Count of distinct chunks received so far.
    pub chunks_received: u32,
    /// Total chunk count (0 before `MetadataAccepted`).
    pub total_chunks: u32,
    /// `chunks_received / total_chunks`, in `[0.0, 1.0]`.
    pub progress: f64,
    /// Bytes received across all accepted chunks.
    pub bytes_received: u64,
    /// Smoothed receive rate, in bytes per second.
    pub rate_bps: f64,
    /// Estimated remaining time to completion, if estimable.
    pub estimated_completion: Option<Duration>,
    /// Up to 10 missing indices, for `chunk_ack.missing_sample`.
    pub missing_sample: Vec<u32>,
}

fn expected_chunk_length(chunk_size: u32, total_chunks: u32, wire_size: u64, index: u32) -> usize {
    if index + 1 == total_chunks {
        let consumed = u64::from(chunk_size) * u64::from(total_chunks - 1);
        usize::try_from(wire_size.saturating_sub(consumed)).unwrap_or(usize::MAX)
    } else {
        chunk_size as usize
    }
}

/// Per-session table and acceptance rules (§3, §4.3).
pub struct TransferSession<E: Environment> {
    env: E,
    session_id: SessionId,
    config: SessionConfig,
    state: SessionState,
    metadata: Option<TransferMetadata>,
    chunk_size: u32,
    total_chunks: u32,
    wire_size: u64,
    received: BTreeMap<u32, Vec<u8>>,
    start_time: Option<E::Instant>,
    last_activity: Option<E::Instant>,
    bytes_received: u64,
}

impl<E: Environment> TransferSession<E> {
    /// Build an idle session bound to a freshly minted `session_id`.
    pub fn new(env: E, session_id: SessionId, config: SessionConfig) -> Self {
        Self {
            env,
            session_id,
            config,
            state: SessionState::Idle,
            metadata: None,
            chunk_size: 0,
            total_chunks: 0,
            wire_size: 0,
            received: BTreeMap::new(),
            start_time: None,
            last_activity: None,
            bytes_received: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The session id this instance was minted with.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Accept `transfer_init` metadata and move to `MetadataAccepted`.
    pub fn start(
        &mut self,
        metadata: TransferMetadata,
        installed_version: u64,
    ) -> Result<StartOutcome, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::TransferAlreadyActive);
        }
        if metadata.file_size == 0 || metadata.file_hash.len() != 64 {
            return Err(SessionError::InvalidMetadata(
                "file_size must be positive and file_hash must be 64 hex chars".to_string(),
            ));
        }
        if metadata.version == 0 {
            return Err(SessionError::InvalidMetadata(
                "version must be strictly positive".to_string(),
            ));
        }

        let wire_size = match metadata.compression {
            Compression::None => metadata.file_size,
            Compression::Gzip => metadata.compressed_size.ok_or_else(|| {
                SessionError::InvalidMetadata(
                    "compressed_size required when compression = gzip".to_string(),
                )
            })?,
        };
        if metadata.compression == Compression::Gzip && metadata.compressed_hash.is_none() {
            return Err(SessionError::InvalidMetadata(
                "compressed_hash required when compression = gzip".to_string(),
            ));
        }

        if wire_size > self.config.max_transfer_size {
            return Err(SessionError::FileTooLarge {
                size: wire_size,
                max: self.config.max_transfer_size,
            });
        }
        if metadata.version <= installed_version {
            return Err(SessionError::VersionTooOld {
                version: metadata.version,
                installed: installed_version,
            });
        }
        if self.config.require_signature && metadata.signature.is_none() {
            return Err(SessionError::MissingSignature);
        }

        let chunk_size = self.config.chunk_size;
        let total_chunks =
            u32::try_from(wire_size.div_ceil(u64::from(chunk_size))).unwrap_or(u32::MAX).max(1);
        let expected_hash = match metadata.compression {
            Compression::None => metadata.file_hash.clone(),
            Compression::Gzip => metadata
                .compressed_hash
                .clone()
                .unwrap_or_else(|| metadata.file_hash.clone()),
        };

        self.chunk_size = chunk_size;
        self.total_chunks = total_chunks;
        self.wire_size = wire_size;
        self.metadata = Some(metadata);
        self.state = SessionState::MetadataAccepted;
        let now = self.env.now();
        self.start_time = Some(now);
        self.last_activity = Some(now);

        Ok(StartOutcome { session_id: self.session_id, chunk_size, total_chunks, expected_hash })
    }

    fn progress(&self) -> f64 {
        if self.total_chunks == 0 {
            0.0
        } else {
            f64::from(u32::try_from(self.received.len()).unwrap_or(u32::MAX))
                / f64::from(self.total_chunks)
        }
    }

    /// Accept or reject one `chunk_data` frame.
    pub fn receive_chunk(
        &mut self,
        frame_session_id: SessionId,
        chunk_index: u32,
        payload: &[u8],
    ) -> Result<ReceiveOutcome, SessionError> {
        match self.state {
            SessionState::MetadataAccepted | SessionState::Receiving => {},
            SessionState::Paused => return Err(SessionError::InvalidState),
            _ => return Err(SessionError::NoActiveTransfer),
        }
        if frame_session_id != self.session_id {
            return Err(SessionError::SessionMismatch);
        }
        if chunk_index >= self.total_chunks {
            return Err(SessionError::ChunkOutOfRange { index: chunk_index, total: self.total_chunks });
        }
        let expected_len =
            expected_chunk_length(self.chunk_size, self.total_chunks, self.wire_size, chunk_index);
        if payload.len() != expected_len {
            return Err(SessionError::WrongChunkLength { expected: expected_len, actual: payload.len() });
        }

        self.last_activity = Some(self.env.now());

        if self.received.contains_key(&chunk_index) {
            let chunks_received = u32::try_from(self.received.len()).unwrap_or(u32::MAX);
            return Ok(ReceiveOutcome::Duplicate {
                chunks_received,
                total_chunks: self.total_chunks,
                progress: self.progress(),
            });
        }

        self.received.insert(chunk_index, payload.to_vec());
        self.bytes_received += payload.len() as u64;
        if self.state == SessionState::MetadataAccepted {
            self.state = SessionState::Receiving;
        }

        if self.received.len() == self.total_chunks as usize {
            self.state = SessionState::Validating;
            let mut assembled = Vec::with_capacity(usize::try_from(self.wire_size).unwrap_or(0));
            for index in 0..self.total_chunks {
                #[allow(clippy::expect_used)]
                let chunk = self.received.get(&index).expect("all indices present by count check");
                assembled.extend_from_slice(chunk);
            }
            return Ok(ReceiveOutcome::Complete { assembled });
        }

        let chunks_received = u32::try_from(self.received.len()).unwrap_or(u32::MAX);
        Ok(ReceiveOutcome::Ack {
            chunks_received,
            total_chunks: self.total_chunks,
            progress: self.progress(),
        })
    }

    /// Suspend receiving. Legal only from `Receiving`.
    pub fn pause(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Receiving {
            return Err(SessionError::InvalidState);
        }
        self.state = SessionState::Paused;
        Ok(())
    }

    /// Resume receiving, returning the missing set so the sender can
    /// replay only those indices.
    pub fn resume(&mut self) -> Result<Vec<u32>, SessionError> {
        if self.state != SessionState::Paused {
            return Err(SessionError::InvalidState);
        }
        self.state = SessionState::Receiving;
        Ok(self.missing())
    }

    /// Cancel the session. Legal from any non-terminal state.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::InvalidState);
        }
        self.state = SessionState::Cancelled;
        Ok(())
    }

    /// Move to `Decompressing` after a successful wire-hash check on a
    /// compressed transfer. Called by the coordinator once C4 reports the
    /// wire hash verified.
    pub fn mark_decompressing(&mut self) {
        self.state = SessionState::Decompressing;
    }

    /// Move to `Committing` after the canonical hash and structural check
    /// succeed.
    pub fn mark_committing(&mut self) {
        self.state = SessionState::Committing;
    }

    /// Move to `Completed` after the atomic store reports a successful
    /// rename.
    pub fn mark_completed(&mut self) {
        self.state = SessionState::Completed;
    }

    /// Move to `Failed`. Called by the coordinator when C4 or C5 reports a
    /// terminal error.
    pub fn mark_failed(&mut self) {
        self.state = SessionState::Failed;
    }

    /// Check the liveness timeout; if exceeded, transitions to `Failed` and
    /// returns `true`.
    pub fn check_timeout(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let Some(last_activity) = self.last_activity else {
            return false;
        };
        if self.env.elapsed(last_activity, self.env.now()) > self.config.session_timeout {
            self.state = SessionState::Failed;
            true
        } else {
            false
        }
    }

    fn missing(&self) -> Vec<u32> {
        (0..self.total_chunks).filter(|i| !self.received.contains_key(i)).collect()
    }

    /// Snapshot of progress and metrics (§4.3 "Metrics").
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let chunks_received = u32::try_from(self.received.len()).unwrap_or(u32::MAX);
        let elapsed = match (self.start_time, self.last_activity) {
            (Some(start), Some(_)) => self.env.elapsed(start, self.env.now()),
            _ => Duration::ZERO,
        };
        let rate_bps = if elapsed.as_secs_f64() > 0.0 {
            self.bytes_received as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let estimated_completion = if chunks_received > 0 && chunks_received < self.total_chunks {
            let remaining = u64::from(self.total_chunks - chunks_received);
            let per_chunk = elapsed.as_secs_f64() / f64::from(chunks_received);
            Some(Duration::from_secs_f64(per_chunk * remaining as f64))
        } else {
            None
        };

        let mut missing_sample = self.missing();
        missing_sample.truncate(10);

        SessionStatus {
            state: self.state,
            chunks_received,
            total_chunks: self.total_chunks,
            progress: self.progress(),
            bytes_received: self.bytes_received,
            rate_bps,
            estimated_completion,
            missing_sample,
        }
    }
}
