//! Sans-IO transfer engine: the auth handshake, the transfer session state
//! machine, and the integrity pipeline (C2, C3, C4).
//!
//! Every state machine here takes events (and, where relevant, the current
//! time through [`env::Environment`]) and returns either a result value or
//! a list of actions for the caller to execute. Nothing in this crate
//! performs I/O directly; the coordinator crate owns the driving loop that
//! turns these into transport writes, log lines, and store commits.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod auth;
pub mod env;
pub mod log;
pub mod pipeline;
pub mod session;

pub use auth::{
    AuthAction, AuthCapabilities, AuthConfig, AuthEngine, AuthError, AuthEvent,
    DEFAULT_AUTH_WINDOW, DEFAULT_MAX_ATTEMPTS, DEFAULT_SESSION_LIFETIME, VerificationKey,
};
pub use env::Environment;
pub use log::LogLevel;
pub use pipeline::{PipelineError, PipelineOutput, Stage};
pub use session::{
    ReceiveOutcome, SessionConfig, SessionError, SessionState, SessionStatus, StartOutcome,
    TransferSession,
};
