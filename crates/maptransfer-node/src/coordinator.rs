//! Session coordinator (C6, §4.6): the single entry point from the
//! transport, wiring the auth engine (C2), the transfer session (C3), the
//! integrity pipeline (C4), and the atomic store (C5) together.
//!
//! One `process_event` entry point dispatching on an event enum, returning
//! a list of actions for the caller to execute. There is exactly one
//! session slot — §1's "one active session at a time" non-goal — so there
//! is no per-connection `HashMap` or registry.

use std::collections::VecDeque;
use std::time::Duration;

use maptransfer_engine::{
    AuthAction, AuthConfig, AuthEngine, AuthError, AuthEvent, Environment, LogLevel, SessionConfig,
    SessionError, SessionState, TransferSession, pipeline,
};
use maptransfer_store::MapStore;
use maptransfer_wire::{ControlCommand, Frame, SessionId, TransferMetadata};

use crate::transport::Channel;

/// Events the coordinator processes, one per decoded inbound frame plus the
/// two runtime-driven signals (§4.6, §5).
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// A frame was decoded off any channel.
    FrameReceived(Frame),
    /// The transport disconnected. Authenticated state and any in-flight
    /// transfer do not survive this (§4.2, §5).
    Disconnected,
    /// Periodic tick driving the rate limiter's queue and the liveness
    /// timeout check (§4.3 "Timeouts", §4.3 "Rate limiting").
    Tick,
}

/// Actions the coordinator asks the caller to perform. No per-session
/// routing, since there is exactly one session and one transport.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorAction {
    /// Send a frame back to the client on the channel its kind belongs to
    /// (see [`channel_for`]).
    SendFrame(Frame),
    /// Emit a log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message text.
        message: String,
    },
    /// Close the transport, e.g. after exhausting auth attempts (§4.2).
    CloseTransport {
        /// Human-readable reason.
        reason: String,
    },
}

/// Which logical channel (§6) a frame destined for the client belongs on.
#[must_use]
pub fn channel_for(frame: &Frame) -> Channel {
    match frame {
        Frame::AuthRequest { .. }
        | Frame::AuthChallenge { .. }
        | Frame::AuthResponse { .. }
        | Frame::AuthSuccess { .. }
        | Frame::AuthError { .. } => Channel::Auth,
        Frame::TransferInit { .. }
        | Frame::TransferReady { .. }
        | Frame::ChunkData { .. }
        | Frame::TransferControl { .. } => Channel::Data,
        Frame::ChunkAck { .. } | Frame::TransferComplete { .. } | Frame::TransferError { .. } => {
            Channel::Status
        },
    }
}

/// Tunable policy bundle for a [`SessionCoordinator`] (§6).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// This device's own identifier, mixed into the auth binding payload.
    pub server_id: String,
    /// Auth handshake policy.
    pub auth: AuthConfig,
    /// Transfer session acceptance policy, including the rate cap the
    /// coordinator itself enforces (§4.3 "Rate limiting").
    pub session: SessionConfig,
}

struct PendingChunk {
    frame_session_id: SessionId,
    chunk_index: u32,
    payload: Vec<u8>,
}

/// Wires C2-C5 together behind one `process_event` entry point (§4.6).
///
/// Owns: the auth engine's state, at most one [`TransferSession`], the
/// store handle, and the rate limiter's pending queue. No process-wide
/// mutable state exists outside one instance of this type (§9).
pub struct SessionCoordinator<E: Environment, S: MapStore> {
    env: E,
    store: S,
    config: CoordinatorConfig,
    auth: AuthEngine<E>,
    authenticated_session: Option<SessionId>,
    session: Option<TransferSession<E>>,
    transfer_metadata: Option<TransferMetadata>,
    transfer_start: Option<E::Instant>,
    pending_chunks: VecDeque<PendingChunk>,
    last_chunk_accept: Option<E::Instant>,
}

impl<E: Environment, S: MapStore> SessionCoordinator<E, S> {
    /// Build a coordinator with no session in progress and no authenticated
    /// client.
    pub fn new(env: E, store: S, config: CoordinatorConfig) -> Self {
        let auth = AuthEngine::new(env.clone(), config.server_id.clone(), config.auth.clone());
        Self {
            env,
            store,
            config,
            auth,
            authenticated_session: None,
            session: None,
            transfer_metadata: None,
            transfer_start: None,
            pending_chunks: VecDeque::new(),
            last_chunk_accept: None,
        }
    }

    /// Process one event and return the actions the caller must execute.
    ///
    /// Never fails: every recoverable error from C2-C5 is translated into a
    /// `Log` and/or an error frame here rather than bubbled to the caller,
    /// per §9 "explicit result values carrying the error kinds" — the
    /// result values are consumed at this one seam.
    pub fn process_event(&mut self, event: CoordinatorEvent) -> Vec<CoordinatorAction> {
        match event {
            CoordinatorEvent::FrameReceived(frame) => self.handle_frame(frame),
            CoordinatorEvent::Disconnected => self.handle_disconnected(),
            CoordinatorEvent::Tick => self.handle_tick(),
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> Vec<CoordinatorAction> {
        match frame {
            Frame::AuthRequest { client_id } => self.handle_auth(AuthEvent::Request { client_id }),
            Frame::AuthResponse { session_id, signature } => {
                self.handle_auth(AuthEvent::Response { session_id, signature })
            },
            Frame::TransferInit { metadata } => self.handle_transfer_init(metadata),
            Frame::ChunkData { session_id, chunk_index, data, .. } => {
                self.handle_chunk_data(session_id, chunk_index, &data)
            },
            Frame::TransferControl { command } => self.handle_control(command),
            other => vec![CoordinatorAction::Log {
                level: LogLevel::Warn,
                message: format!("ignoring frame not legal on an inbound channel: {other:?}"),
            }],
        }
    }

    fn handle_auth(&mut self, event: AuthEvent) -> Vec<CoordinatorAction> {
        match self.auth.process(event) {
            Ok(actions) => actions
                .into_iter()
                .map(|action| match action {
                    AuthAction::SendFrame(frame) => {
                        if let Frame::AuthSuccess { session_id, .. } = &frame {
                            self.authenticated_session = Some(*session_id);
                        }
                        CoordinatorAction::SendFrame(frame)
                    },
                    AuthAction::Log { level, message } => CoordinatorAction::Log { level, message },
                })
                .collect(),
            Err(err) => self.auth_failure_actions(&err),
        }
    }

    fn auth_failure_actions(&self, err: &AuthError) -> Vec<CoordinatorAction> {
        let mut actions = vec![
            CoordinatorAction::Log {
                level: LogLevel::Warn,
                message: format!("auth failure: {err}"),
            },
            CoordinatorAction::SendFrame(Frame::AuthError {
                code: err.code().to_string(),
                message: err.to_string(),
            }),
        ];
        // §4.2 "on exhaustion — transitions to Failed and forces a
        // disconnect" — the only auth failure that ends the connection
        // rather than just resetting the handshake.
        if matches!(err, AuthError::AuthFailed(msg) if msg.contains("maximum attempts exceeded")) {
            actions.push(CoordinatorAction::CloseTransport {
                reason: "authentication attempts exhausted".to_string(),
            });
        }
        actions
    }

    fn handle_transfer_init(&mut self, metadata: TransferMetadata) -> Vec<CoordinatorAction> {
        let Some(session_id) = self.authenticated_session else {
            return self.transfer_error_actions(
                AuthError::AuthRequired.code(),
                &AuthError::AuthRequired.to_string(),
                AuthError::AuthRequired.is_transient(),
            );
        };
        if let Some(existing) = &self.session {
            if !existing.state().is_terminal() {
                let err = SessionError::TransferAlreadyActive;
                return self.transfer_error_actions(err.code(), &err.to_string(), err.is_transient());
            }
        }

        let installed_version = match self.store.installed_version() {
            Ok(v) => v,
            Err(err) => {
                return self.transfer_error_actions(err.code(), &err.to_string(), err.is_transient());
            },
        };

        let mut session =
            TransferSession::new(self.env.clone(), session_id, self.config.session.clone());
        match session.start(metadata.clone(), installed_version) {
            Ok(outcome) => {
                self.transfer_metadata = Some(metadata);
                self.transfer_start = Some(self.env.now());
                self.session = Some(session);
                self.last_chunk_accept = None;
                self.pending_chunks.clear();
                vec![
                    CoordinatorAction::Log {
                        level: LogLevel::Info,
                        message: format!(
                            "transfer_init accepted: session={}, total_chunks={}",
                            outcome.session_id, outcome.total_chunks
                        ),
                    },
                    CoordinatorAction::SendFrame(Frame::TransferReady {
                        session_id: outcome.session_id,
                        chunk_size: outcome.chunk_size,
                        total_chunks: outcome.total_chunks,
                        expected_hash: outcome.expected_hash,
                    }),
                ]
            },
            Err(err) => self.transfer_error_actions(err.code(), &err.to_string(), err.is_transient()),
        }
    }

    fn handle_chunk_data(
        &mut self,
        session_id: SessionId,
        chunk_index: u32,
        hex_data: &str,
    ) -> Vec<CoordinatorAction> {
        if self.authenticated_session.is_none() {
            return self.transfer_error_actions(
                AuthError::AuthRequired.code(),
                &AuthError::AuthRequired.to_string(),
                AuthError::AuthRequired.is_transient(),
            );
        }
        if self.session.is_none() {
            let err = SessionError::NoActiveTransfer;
            return self.transfer_error_actions(err.code(), &err.to_string(), err.is_transient());
        }
        let payload = match maptransfer_wire::decode_chunk_hex(hex_data) {
            Ok(bytes) => bytes,
            Err(_) => {
                let err = SessionError::InvalidEncoding;
                return self.transfer_error_actions(err.code(), &err.to_string(), err.is_transient());
            },
        };

        if self.chunk_acceptance_due() {
            self.last_chunk_accept = Some(self.env.now());
            self.accept_chunk(session_id, chunk_index, payload)
        } else {
            self.pending_chunks.push_back(PendingChunk { frame_session_id: session_id, chunk_index, payload });
            vec![CoordinatorAction::Log {
                level: LogLevel::Debug,
                message: format!("chunk {chunk_index} deferred: acceptance rate exceeded"),
            }]
        }
    }

    /// Whether a freshly arrived chunk may be accepted immediately: the
    /// queue must be empty (anything already waiting keeps its place) and
    /// the rate interval must have elapsed.
    fn chunk_acceptance_due(&self) -> bool {
        self.pending_chunks.is_empty() && self.rate_interval_elapsed()
    }

    /// Whether `min_chunk_interval` has elapsed since the last accepted
    /// chunk. Unlike [`Self::chunk_acceptance_due`], this does not care
    /// whether the queue is empty — it is the drain-side predicate the
    /// tick handler uses to pop deferred chunks one interval at a time.
    fn rate_interval_elapsed(&self) -> bool {
        let Some(last) = self.last_chunk_accept else { return true };
        self.env.elapsed(last, self.env.now()) >= self.min_chunk_interval()
    }

    fn min_chunk_interval(&self) -> Duration {
        let rate = self.config.session.max_chunks_per_second.max(1);
        Duration::from_secs_f64(1.0 / f64::from(rate))
    }

    fn accept_chunk(
        &mut self,
        frame_session_id: SessionId,
        chunk_index: u32,
        payload: Vec<u8>,
    ) -> Vec<CoordinatorAction> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        match session.receive_chunk(frame_session_id, chunk_index, &payload) {
            Ok(maptransfer_engine::ReceiveOutcome::Ack { chunks_received, total_chunks, progress }) => {
                vec![CoordinatorAction::SendFrame(ack_frame(
                    chunk_index,
                    chunks_received,
                    total_chunks,
                    progress,
                    &[],
                ))]
            },
            Ok(maptransfer_engine::ReceiveOutcome::Duplicate { chunks_received, total_chunks, progress }) => {
                vec![
                    CoordinatorAction::Log {
                        level: LogLevel::Debug,
                        message: format!("duplicate chunk {chunk_index} ignored"),
                    },
                    CoordinatorAction::SendFrame(ack_frame(
                        chunk_index,
                        chunks_received,
                        total_chunks,
                        progress,
                        &[],
                    )),
                ]
            },
            Ok(maptransfer_engine::ReceiveOutcome::Complete { assembled }) => self.complete_transfer(assembled),
            Err(err) => {
                let mut actions = vec![CoordinatorAction::Log {
                    level: LogLevel::Warn,
                    message: format!("chunk {chunk_index} rejected: {err}"),
                }];
                actions.extend(self.transfer_error_actions(err.code(), &err.to_string(), err.is_transient()));
                actions
            },
        }
    }

    fn complete_transfer(&mut self, assembled: Vec<u8>) -> Vec<CoordinatorAction> {
        let Some(metadata) = self.transfer_metadata.clone() else { return Vec::new() };
        let mut actions = vec![CoordinatorAction::Log {
            level: LogLevel::Debug,
            message: "all chunks received, running integrity pipeline".to_string(),
        }];

        match pipeline::run(&assembled, &metadata) {
            Ok(output) => {
                if output.stage == pipeline::Stage::Decompressed {
                    if let Some(session) = self.session.as_mut() {
                        session.mark_decompressing();
                    }
                }
                if let Some(session) = self.session.as_mut() {
                    session.mark_committing();
                }
                match self.store.commit(&output.canonical_bytes, metadata.version) {
                    Ok(outcome) => {
                        if let Some(session) = self.session.as_mut() {
                            session.mark_completed();
                        }
                        let duration = self
                            .transfer_start
                            .map(|start| self.env.elapsed(start, self.env.now()).as_secs_f64())
                            .unwrap_or(0.0);
                        actions.push(CoordinatorAction::Log {
                            level: LogLevel::Info,
                            message: format!(
                                "transfer complete: version={}, backup={:?}",
                                outcome.version, outcome.backup
                            ),
                        });
                        actions.push(CoordinatorAction::SendFrame(Frame::TransferComplete {
                            session_id: self
                                .session
                                .as_ref()
                                .map_or(SessionId::from_bytes([0; 16]), |s| s.session_id()),
                            file_hash: metadata.file_hash.clone(),
                            file_size: metadata.file_size,
                            duration,
                            new_version: outcome.version,
                        }));
                    },
                    Err(err) => {
                        if let Some(session) = self.session.as_mut() {
                            session.mark_failed();
                        }
                        actions.extend(self.transfer_error_actions(
                            err.code(),
                            &err.to_string(),
                            err.is_transient(),
                        ));
                    },
                }
            },
            Err(err) => {
                if let Some(session) = self.session.as_mut() {
                    session.mark_failed();
                }
                actions.extend(self.transfer_error_actions(err.code(), &err.to_string(), err.is_transient()));
            },
        }

        self.cleanup_terminal_session();
        actions
    }

    fn handle_control(&mut self, command: ControlCommand) -> Vec<CoordinatorAction> {
        if self.authenticated_session.is_none() {
            return self.transfer_error_actions(
                AuthError::AuthRequired.code(),
                &AuthError::AuthRequired.to_string(),
                AuthError::AuthRequired.is_transient(),
            );
        }
        let Some(session) = self.session.as_mut() else {
            let err = SessionError::NoActiveTransfer;
            return self.transfer_error_actions(err.code(), &err.to_string(), err.is_transient());
        };

        match command {
            ControlCommand::Pause => match session.pause() {
                Ok(()) => vec![CoordinatorAction::SendFrame(status_ack_frame(session))],
                Err(err) => self.transfer_error_actions(err.code(), &err.to_string(), err.is_transient()),
            },
            ControlCommand::Resume => match session.resume() {
                Ok(missing) => {
                    let mut sample = missing;
                    sample.truncate(10);
                    vec![CoordinatorAction::SendFrame(status_ack_frame_with_missing(session, sample))]
                },
                Err(err) => self.transfer_error_actions(err.code(), &err.to_string(), err.is_transient()),
            },
            ControlCommand::Status => vec![CoordinatorAction::SendFrame(status_ack_frame(session))],
            ControlCommand::Cancel => match session.cancel() {
                Ok(()) => {
                    let actions = vec![
                        CoordinatorAction::Log {
                            level: LogLevel::Info,
                            message: "transfer cancelled by client".to_string(),
                        },
                        CoordinatorAction::SendFrame(Frame::TransferError {
                            code: SessionError::CancelledByUser.code().to_string(),
                            message: SessionError::CancelledByUser.to_string(),
                            retry_suggested: false,
                        }),
                    ];
                    self.cleanup_terminal_session();
                    actions
                },
                Err(err) => self.transfer_error_actions(err.code(), &err.to_string(), err.is_transient()),
            },
        }
    }

    fn handle_disconnected(&mut self) -> Vec<CoordinatorAction> {
        let _ = self.auth.process(AuthEvent::Disconnected);
        self.authenticated_session = None;
        if let Some(session) = self.session.as_mut() {
            if !session.state().is_terminal() {
                let _ = session.cancel();
            }
        }
        self.cleanup_terminal_session();
        self.pending_chunks.clear();
        vec![CoordinatorAction::Log {
            level: LogLevel::Info,
            message: "transport disconnected".to_string(),
        }]
    }

    fn handle_tick(&mut self) -> Vec<CoordinatorAction> {
        let mut actions = Vec::new();

        if let Some(session) = self.session.as_mut() {
            if session.check_timeout() {
                actions.push(CoordinatorAction::Log {
                    level: LogLevel::Warn,
                    message: "session timed out".to_string(),
                });
                actions.push(CoordinatorAction::SendFrame(Frame::TransferError {
                    code: SessionError::Timeout.code().to_string(),
                    message: SessionError::Timeout.to_string(),
                    retry_suggested: false,
                }));
                self.cleanup_terminal_session();
                self.pending_chunks.clear();
                return actions;
            }
        }

        if self.rate_interval_elapsed() {
            if let Some(pending) = self.pending_chunks.pop_front() {
                self.last_chunk_accept = Some(self.env.now());
                actions.extend(self.accept_chunk(
                    pending.frame_session_id,
                    pending.chunk_index,
                    pending.payload,
                ));
            }
        }
        actions
    }

    fn cleanup_terminal_session(&mut self) {
        if self.session.as_ref().is_some_and(|s| s.state().is_terminal()) {
            self.session = None;
            self.transfer_metadata = None;
            self.transfer_start = None;
        }
    }

    fn transfer_error_actions(
        &self,
        code: &str,
        message: &str,
        retry_suggested: bool,
    ) -> Vec<CoordinatorAction> {
        vec![CoordinatorAction::SendFrame(Frame::TransferError {
            code: code.to_string(),
            message: message.to_string(),
            retry_suggested,
        })]
    }
}

fn ack_frame(
    chunk_index: u32,
    chunks_received: u32,
    total_chunks: u32,
    progress: f64,
    missing_sample: &[u32],
) -> Frame {
    Frame::ChunkAck {
        chunk_index,
        chunks_received,
        total_chunks,
        progress,
        missing_sample: missing_sample.to_vec(),
    }
}

/// `pause`/`resume`/`status` control commands reuse `ChunkAck` as a status
/// snapshot rather than minting a dedicated frame kind; `chunk_index` is
/// meaningless here and left at `0`.
fn status_ack_frame<E: Environment>(session: &TransferSession<E>) -> Frame {
    let status = session.status();
    ack_frame(0, status.chunks_received, status.total_chunks, status.progress, &status.missing_sample)
}

fn status_ack_frame_with_missing<E: Environment>(
    session: &TransferSession<E>,
    missing_sample: Vec<u32>,
) -> Frame {
    let status = session.status();
    ack_frame(0, status.chunks_received, status.total_chunks, status.progress, &missing_sample)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use maptransfer_crypto::{keyed_digest_hex, sha256_hex};
    use maptransfer_engine::{AuthCapabilities, VerificationKey};
    use maptransfer_store::MemoryMapStore;
    use maptransfer_wire::{Compression, TransferMetadata};

    use super::*;

    #[derive(Clone)]
    struct TestEnv {
        now: Arc<Mutex<Duration>>,
        next_random: Arc<Mutex<u8>>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self { now: Arc::new(Mutex::new(Duration::ZERO)), next_random: Arc::new(Mutex::new(0)) }
        }

        fn advance(&self, by: Duration) {
            #[allow(clippy::unwrap_used)]
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Environment for TestEnv {
        type Instant = Duration;

        fn now(&self) -> Self::Instant {
            #[allow(clippy::unwrap_used)]
            *self.now.lock().unwrap()
        }

        fn elapsed(&self, earlier: Self::Instant, later: Self::Instant) -> Duration {
            later.saturating_sub(earlier)
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            #[allow(clippy::unwrap_used)]
            let mut counter = self.next_random.lock().unwrap();
            for byte in buffer.iter_mut() {
                *byte = *counter;
                *counter = counter.wrapping_add(1);
            }
        }

        fn wall_clock_secs(&self) -> u64 {
            #[allow(clippy::unwrap_used)]
            self.now.lock().unwrap().as_secs()
        }
    }

    const DEV_SECRET: &[u8] = b"dev-secret";

    fn config() -> CoordinatorConfig {
        CoordinatorConfig {
            server_id: "node-1".to_string(),
            auth: AuthConfig {
                window: Duration::from_secs(30),
                max_attempts: 3,
                session_lifetime: Duration::from_secs(300),
                verification_key: VerificationKey::KeyedDigest(DEV_SECRET.to_vec()),
                capabilities: AuthCapabilities::default(),
            },
            session: SessionConfig { chunk_size: 16, require_signature: false, ..SessionConfig::default() },
        }
    }

    fn authenticate(coord: &mut SessionCoordinator<TestEnv, MemoryMapStore>) -> SessionId {
        let actions =
            coord.process_event(CoordinatorEvent::FrameReceived(Frame::AuthRequest {
                client_id: "terminal-1".to_string(),
            }));
        let (session_id, payload_hash) = actions
            .iter()
            .find_map(|a| match a {
                CoordinatorAction::SendFrame(Frame::AuthChallenge { session_id, payload_hash, .. }) => {
                    Some((*session_id, payload_hash.clone()))
                },
                _ => None,
            })
            .expect("challenge issued");

        let payload_bytes = hex::decode(payload_hash).expect("hex");
        let signature = keyed_digest_hex(DEV_SECRET, &payload_bytes);
        let actions = coord.process_event(CoordinatorEvent::FrameReceived(Frame::AuthResponse {
            session_id,
            signature,
        }));
        assert!(actions.iter().any(|a| matches!(
            a,
            CoordinatorAction::SendFrame(Frame::AuthSuccess { .. })
        )));
        session_id
    }

    fn canonical_map() -> Vec<u8> {
        br#"{"metadata":{"version":42},"zones":[]}"#.to_vec()
    }

    fn init_metadata(bytes: &[u8], version: u64) -> TransferMetadata {
        TransferMetadata {
            file_size: bytes.len() as u64,
            file_hash: sha256_hex(bytes),
            version,
            signature: None,
            compression: Compression::None,
            compressed_size: None,
            compressed_hash: None,
        }
    }

    #[test]
    fn data_frame_before_auth_is_rejected() {
        let env = TestEnv::new();
        let mut coord = SessionCoordinator::new(env, MemoryMapStore::new(), config());
        let actions = coord.process_event(CoordinatorEvent::FrameReceived(Frame::TransferInit {
            metadata: init_metadata(&canonical_map(), 1),
        }));
        assert!(actions.iter().any(|a| matches!(
            a,
            CoordinatorAction::SendFrame(Frame::TransferError { code, .. }) if code == "AuthRequired"
        )));
    }

    #[test]
    fn happy_path_completes_and_installs() {
        let env = TestEnv::new();
        let store = MemoryMapStore::new();
        let mut coord = SessionCoordinator::new(env.clone(), store.clone(), config());
        authenticate(&mut coord);

        let bytes = canonical_map();
        let metadata = init_metadata(&bytes, 42);
        let actions =
            coord.process_event(CoordinatorEvent::FrameReceived(Frame::TransferInit { metadata }));
        let (session_id, total_chunks) = actions
            .iter()
            .find_map(|a| match a {
                CoordinatorAction::SendFrame(Frame::TransferReady {
                    session_id,
                    total_chunks,
                    ..
                }) => Some((*session_id, *total_chunks)),
                _ => None,
            })
            .expect("transfer_ready");

        let mut completed = false;
        for index in 0..total_chunks {
            let start = index as usize * 16;
            let end = ((index as usize) + 1) * 16;
            let chunk = &bytes[start..end.min(bytes.len())];
            env.advance(Duration::from_millis(200));
            let actions = coord.process_event(CoordinatorEvent::FrameReceived(Frame::ChunkData {
                session_id,
                chunk_index: index,
                data: hex::encode(chunk),
                checksum: None,
            }));
            if actions.iter().any(|a| matches!(a, CoordinatorAction::SendFrame(Frame::TransferComplete { .. })))
            {
                completed = true;
            }
        }

        assert!(completed, "expected transfer_complete");
        assert_eq!(store.active_bytes().unwrap(), bytes);
        assert_eq!(store.installed_version().unwrap(), 42);
    }

    #[test]
    fn version_regression_is_rejected_before_any_chunk() {
        let env = TestEnv::new();
        let store = MemoryMapStore::new();
        store.seed(10, b"{}".to_vec());
        let mut coord = SessionCoordinator::new(env, store, config());
        authenticate(&mut coord);

        let bytes = canonical_map();
        let metadata = init_metadata(&bytes, 10);
        let actions =
            coord.process_event(CoordinatorEvent::FrameReceived(Frame::TransferInit { metadata }));
        assert!(actions.iter().any(|a| matches!(
            a,
            CoordinatorAction::SendFrame(Frame::TransferError { code, .. }) if code == "VersionTooOld"
        )));
    }

    #[test]
    fn duplicate_chunk_does_not_fail_the_session() {
        let env = TestEnv::new();
        let mut coord = SessionCoordinator::new(env.clone(), MemoryMapStore::new(), config());
        authenticate(&mut coord);
        let bytes = canonical_map();
        let metadata = init_metadata(&bytes, 1);
        let actions =
            coord.process_event(CoordinatorEvent::FrameReceived(Frame::TransferInit { metadata }));
        let session_id = actions
            .iter()
            .find_map(|a| match a {
                CoordinatorAction::SendFrame(Frame::TransferReady { session_id, .. }) => Some(*session_id),
                _ => None,
            })
            .expect("transfer_ready");

        let chunk = Frame::ChunkData {
            session_id,
            chunk_index: 0,
            data: hex::encode(&bytes[0..16]),
            checksum: None,
        };
        coord.process_event(CoordinatorEvent::FrameReceived(chunk.clone()));
        env.advance(Duration::from_millis(200));
        let actions = coord.process_event(CoordinatorEvent::FrameReceived(chunk));
        assert!(actions.iter().any(|a| matches!(a, CoordinatorAction::Log { message, .. } if message.contains("duplicate"))));
    }

    #[test]
    fn excess_rate_defers_rather_than_drops() {
        let env = TestEnv::new();
        let mut coord = SessionCoordinator::new(env.clone(), MemoryMapStore::new(), config());
        authenticate(&mut coord);
        let bytes = canonical_map();
        let metadata = init_metadata(&bytes, 1);
        let actions =
            coord.process_event(CoordinatorEvent::FrameReceived(Frame::TransferInit { metadata }));
        let session_id = actions
            .iter()
            .find_map(|a| match a {
                CoordinatorAction::SendFrame(Frame::TransferReady { session_id, .. }) => Some(*session_id),
                _ => None,
            })
            .expect("transfer_ready");

        let actions = coord.process_event(CoordinatorEvent::FrameReceived(Frame::ChunkData {
            session_id,
            chunk_index: 0,
            data: hex::encode(&bytes[0..16]),
            checksum: None,
        }));
        assert!(actions.iter().any(|a| matches!(a, CoordinatorAction::SendFrame(Frame::ChunkAck { .. }))));

        // Immediately sent second chunk with no time advance: deferred, not dropped.
        let actions = coord.process_event(CoordinatorEvent::FrameReceived(Frame::ChunkData {
            session_id,
            chunk_index: 1,
            data: hex::encode(&bytes[16..32]),
            checksum: None,
        }));
        assert!(actions.iter().any(|a| matches!(a, CoordinatorAction::Log { message, .. } if message.contains("deferred"))));

        let actions = coord.process_event(CoordinatorEvent::Tick);
        assert!(actions.is_empty(), "interval has not elapsed yet");

        // Once the rate interval elapses, the deferred chunk drains on the
        // next Tick even though nothing new arrived on the data channel.
        env.advance(Duration::from_millis(100));
        let actions = coord.process_event(CoordinatorEvent::Tick);
        assert!(
            actions.iter().any(|a| matches!(
                a,
                CoordinatorAction::SendFrame(Frame::ChunkAck { chunk_index: 1, chunks_received: 2, .. })
            )),
            "deferred chunk should drain once the rate interval elapses, got {actions:?}"
        );
    }
}
