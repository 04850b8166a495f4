//! Coordinator-level error vocabulary (C6, §7).
//!
//! Wraps each crate boundary's own error enum with an explicit `From`
//! conversion (§9 "explicit result values carrying the error kinds").

use maptransfer_engine::{AuthError, PipelineError, SessionError};
use maptransfer_store::StoreError;
use maptransfer_wire::WireError;
use thiserror::Error;

/// Failures from [`crate::coordinator::SessionCoordinator::process_event`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    /// A frame failed to decode off the transport.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The auth handshake rejected a frame.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The transfer session rejected a frame or operation.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The integrity pipeline failed on the assembled buffer.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// The atomic store rejected or failed the commit.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoordinatorError {
    /// Stable wire error code (§7), delegating to whichever crate's error
    /// this wraps.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Wire(e) => e_code_wire(e),
            Self::Auth(e) => e.code(),
            Self::Session(e) => e.code(),
            Self::Pipeline(e) => e.code(),
            Self::Store(e) => e.code(),
        }
    }

    /// Whether the sender may reasonably retry (§7 "local recovery"
    /// column), delegating to whichever crate's error this wraps.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Wire(e) => e.is_transient(),
            Self::Auth(e) => e.is_transient(),
            Self::Session(e) => e.is_transient(),
            Self::Pipeline(e) => e.is_transient(),
            Self::Store(e) => e.is_transient(),
        }
    }
}

fn e_code_wire(err: &WireError) -> &'static str {
    match err {
        WireError::FrameTooLarge { .. } => "FrameTooLarge",
        WireError::Malformed(_) => "Malformed",
        WireError::UnknownType(_) => "UnknownType",
        WireError::InvalidEncoding => "InvalidEncoding",
        WireError::ChecksumMismatch => "ChecksumMismatch",
    }
}
