//! Challenge/response authentication (C2, §4.2).

mod engine;
mod error;

pub use engine::{
    AuthAction, AuthCapabilities, AuthConfig, AuthEngine, AuthEvent, DEFAULT_AUTH_WINDOW,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_SESSION_LIFETIME, VerificationKey,
};
pub use error::AuthError;
