//! Challenge/response authentication engine (§4.2).

use std::time::Duration;

use maptransfer_crypto::{sha256_hex, verify_ecdsa_p256, verify_keyed_digest};
use maptransfer_wire::{Frame, ServerCapabilities, SessionId};

use super::error::AuthError;
use crate::env::Environment;
use crate::log::LogLevel;

/// Default handshake window (§6 `auth.window_seconds`).
pub const DEFAULT_AUTH_WINDOW: Duration = Duration::from_secs(30);
/// Default max verification attempts per challenge (§6 `auth.max_attempts`).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default authenticated-session lifetime covering the whole transfer.
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(300);

/// Capabilities echoed back in `auth_success` (§6).
#[derive(Debug, Clone)]
pub struct AuthCapabilities {
    /// Maximum accepted wire size, in bytes.
    pub max_transfer_size: u64,
    /// Negotiated chunk size, in bytes.
    pub chunk_size: u32,
    /// Supported compression modes.
    pub compression: Vec<String>,
    /// Whether pause/resume is supported.
    pub resume: bool,
}

impl Default for AuthCapabilities {
    fn default() -> Self {
        Self {
            max_transfer_size: 5 * 1024 * 1024,
            chunk_size: 128,
            compression: vec!["none".to_string(), "gzip".to_string()],
            resume: true,
        }
    }
}

/// How the engine verifies a challenge response.
#[derive(Debug, Clone)]
pub enum VerificationKey {
    /// Production mode: SEC1-encoded ECDSA-P256 public key.
    EcdsaP256(Vec<u8>),
    /// Development mode: shared secret for a keyed digest.
    KeyedDigest(Vec<u8>),
}

/// Tunable handshake policy (§6).
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// How long a response has to arrive after the challenge is issued.
    pub window: Duration,
    /// Max verification attempts before the challenge is burned.
    pub max_attempts: u32,
    /// Lifetime of an authenticated session, covering the whole transfer.
    pub session_lifetime: Duration,
    /// Verification material; selects production vs. development mode.
    pub verification_key: VerificationKey,
    /// Capabilities to advertise on success.
    pub capabilities: AuthCapabilities,
}

/// Events the coordinator routes to the auth engine.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// `auth_request` received on the auth channel.
    Request {
        /// Client-supplied identifier of the connecting terminal.
        client_id: String,
    },
    /// `auth_response` received on the auth channel.
    Response {
        /// Session id the client claims to be responding for.
        session_id: SessionId,
        /// Hex-encoded signature or keyed digest.
        signature: String,
    },
    /// The transport disconnected; authenticated state does not survive
    /// this (§4.2 "Authenticated state does not survive a transport
    /// disconnect").
    Disconnected,
}

/// Actions the auth engine asks the coordinator to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthAction {
    /// Send a frame back to the client.
    SendFrame(Frame),
    /// Emit a log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message text.
        message: String,
    },
}

struct OutstandingChallenge<I> {
    client_id: String,
    session_id: SessionId,
    payload_hash: [u8; 32],
    issued_at: I,
    attempts: u32,
}

struct AuthenticatedSession<I> {
    session_id: SessionId,
    authenticated_at: I,
}

/// Challenge/response authenticator (§4.2).
///
/// One instance per connection/coordinator, holding at most one
/// outstanding challenge and at most one authenticated session — there is
/// no process-wide challenge table (§9 "no process-wide mutables").
pub struct AuthEngine<E: Environment> {
    env: E,
    server_id: String,
    config: AuthConfig,
    outstanding: Option<OutstandingChallenge<E::Instant>>,
    authenticated: Option<AuthenticatedSession<E::Instant>>,
}

impl<E: Environment> AuthEngine<E> {
    /// Build a new engine bound to `server_id` (the device's own
    /// identifier, mixed into the challenge binding payload).
    pub fn new(env: E, server_id: impl Into<String>, config: AuthConfig) -> Self {
        Self { env, server_id: server_id.into(), config, outstanding: None, authenticated: None }
    }

    /// Whether `session_id` is currently authenticated and unexpired.
    #[must_use]
    pub fn is_authenticated(&self, session_id: SessionId) -> bool {
        match &self.authenticated {
            Some(session) if session.session_id == session_id => {
                self.env.elapsed(session.authenticated_at, self.env.now())
                    <= self.config.session_lifetime
            },
            _ => false,
        }
    }

    /// Process one auth-channel event.
    pub fn process(&mut self, event: AuthEvent) -> Result<Vec<AuthAction>, AuthError> {
        match event {
            AuthEvent::Request { client_id } => Ok(self.handle_request(client_id)),
            AuthEvent::Response { session_id, signature } => {
                self.handle_response(session_id, &signature)
            },
            AuthEvent::Disconnected => {
                self.authenticated = None;
                self.outstanding = None;
                Ok(Vec::new())
            },
        }
    }

    fn handle_request(&mut self, client_id: String) -> Vec<AuthAction> {
        let nonce_bytes: u128 = self.env.random_u128();
        let nonce = nonce_bytes.to_be_bytes();
        let mut session_id_bytes = [0u8; 16];
        self.env.random_bytes(&mut session_id_bytes);
        let session_id = SessionId::from_bytes(session_id_bytes);
        let timestamp = self.env.wall_clock_secs();

        let payload_hash = binding_payload_hash(&self.server_id, &nonce, timestamp, session_id);

        self.outstanding = Some(OutstandingChallenge {
            client_id: client_id.clone(),
            session_id,
            payload_hash,
            issued_at: self.env.now(),
            attempts: 0,
        });

        vec![
            AuthAction::Log {
                level: LogLevel::Debug,
                message: format!("challenge issued to {client_id}"),
            },
            AuthAction::SendFrame(Frame::AuthChallenge {
                session_id,
                nonce: hex::encode(nonce),
                timestamp,
                payload_hash: hex::encode(payload_hash),
            }),
        ]
    }

    fn handle_response(
        &mut self,
        session_id: SessionId,
        signature: &str,
    ) -> Result<Vec<AuthAction>, AuthError> {
        let Some(challenge) = self.outstanding.as_mut() else {
            return Err(AuthError::NoActiveChallenge);
        };

        if challenge.session_id != session_id {
            self.outstanding = None;
            return Err(AuthError::AuthFailed("session id mismatch".to_string()));
        }

        let elapsed = self.env.elapsed(challenge.issued_at, self.env.now());
        if elapsed > self.config.window {
            self.outstanding = None;
            return Err(AuthError::AuthExpired);
        }

        // Verification failure (empty signature, malformed hex, or a
        // signature that plain doesn't verify) counts against
        // `max_attempts` but does *not* burn the challenge until the count
        // is exhausted — the client gets `max_attempts` tries at the same
        // outstanding challenge before a fresh `auth_request` is required
        // (§4.2 "attempts ≤ max_attempts").
        let verified = !signature.is_empty()
            && match &self.config.verification_key {
                VerificationKey::EcdsaP256(public_key) => hex::decode(signature)
                    .is_ok_and(|sig| verify_ecdsa_p256(public_key, &challenge.payload_hash, &sig).is_ok()),
                VerificationKey::KeyedDigest(secret) => {
                    verify_keyed_digest(secret, &challenge.payload_hash, signature)
                },
            };

        if !verified {
            challenge.attempts += 1;
            if challenge.attempts > self.config.max_attempts {
                self.outstanding = None;
                return Err(AuthError::AuthFailed("maximum attempts exceeded".to_string()));
            }
            return Err(AuthError::InvalidSignature);
        }

        let client_id = challenge.client_id.clone();
        self.outstanding = None;
        self.authenticated =
            Some(AuthenticatedSession { session_id, authenticated_at: self.env.now() });

        Ok(vec![
            AuthAction::Log {
                level: LogLevel::Info,
                message: format!("authenticated {client_id}"),
            },
            AuthAction::SendFrame(Frame::AuthSuccess {
                session_id,
                server_capabilities: ServerCapabilities {
                    max_transfer_size: self.config.capabilities.max_transfer_size,
                    chunk_size: self.config.capabilities.chunk_size,
                    compression: self.config.capabilities.compression.clone(),
                    resume: self.config.capabilities.resume,
                },
            }),
        ])
    }
}

/// `H(device_id ‖ nonce ‖ timestamp ‖ session_id)` under SHA-256 (§4.2).
fn binding_payload_hash(
    server_id: &str,
    nonce: &[u8; 16],
    timestamp: u64,
    session_id: SessionId,
) -> [u8; 32] {
    let mut buf = Vec::with_capacity(server_id.len() + 16 + 8 + 16);
    buf.extend_from_slice(server_id.as_bytes());
    buf.extend_from_slice(nonce);
    buf.extend_from_slice(&timestamp.to_be_bytes());
    buf.extend_from_slice(&session_id.as_u128().to_be_bytes());
    let hex_digest = sha256_hex(&buf);
    let mut out = [0u8; 32];
    // sha256_hex always returns 64 hex chars decoding to exactly 32 bytes.
    #[allow(clippy::unwrap_used)]
    hex::decode_to_slice(hex_digest, &mut out).unwrap();
    out
}
