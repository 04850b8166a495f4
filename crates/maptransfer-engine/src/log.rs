//! Log severity for actions emitted by the state machines in this crate.
//!
//! State machines never call `tracing` directly — they return
//! `Log { level, message }` actions and the driving loop maps them onto
//! `tracing::{debug,info,warn,error}!`. This keeps the machines pure and
//! testable without a logging subscriber.

/// Severity of a log action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Fine-grained diagnostic detail.
    Debug,
    /// Routine lifecycle events.
    Info,
    /// Recoverable problems worth an operator's attention.
    Warn,
    /// Terminal failures.
    Error,
}
