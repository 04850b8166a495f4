//! Driving loop wiring a [`Transport`] to a [`SessionCoordinator`] (§4.6
//! ambient addition).
//!
//! Reads raw per-write buffers off the transport, decodes them through
//! `maptransfer_wire`, feeds the coordinator, and executes the actions it
//! returns: encoding replies back out, emitting log lines through
//! `tracing`, and closing the transport on request. One function drains
//! inbound frames into the state machine; a second executes the actions
//! it returns.

use std::time::Duration;

use maptransfer_engine::{Environment, LogLevel};
use maptransfer_store::MapStore;
use maptransfer_wire::{DEFAULT_MAX_FRAME_SIZE, decode, encode_for_write};

use crate::coordinator::{CoordinatorAction, CoordinatorEvent, SessionCoordinator, channel_for};
use crate::transport::{Transport, TransportError};

/// How often [`CoordinatorEvent::Tick`] fires while no frame is pending
/// (§4.3 "Rate limiting", §4.3 "Timeouts").
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Drive one connection to completion.
///
/// Loops until the transport disconnects: decoding inbound writes (warning
/// and dropping ones that fail to decode, rather than tearing down the
/// connection — a malformed write is the sender's problem, not grounds to
/// disconnect it), feeding the coordinator, and executing the actions it
/// returns. Returns once the transport reports disconnection or an action
/// asks to close it.
pub async fn run<E, S, T>(env: E, mut coordinator: SessionCoordinator<E, S>, mut transport: T)
where
    E: Environment,
    S: MapStore,
    T: Transport,
{
    loop {
        let event = tokio::select! {
            biased;
            write = transport.recv() => match write {
                Some((_channel, buf)) => match decode(&buf, DEFAULT_MAX_FRAME_SIZE) {
                    Ok(frame) => CoordinatorEvent::FrameReceived(frame),
                    Err(err) => {
                        tracing::warn!(%err, "dropping malformed frame");
                        continue;
                    },
                },
                None => CoordinatorEvent::Disconnected,
            },
            () = env.sleep(TICK_INTERVAL) => CoordinatorEvent::Tick,
        };

        let disconnecting = matches!(event, CoordinatorEvent::Disconnected);
        let actions = coordinator.process_event(event);
        let closed = execute_actions(&mut transport, actions).await.is_err();
        if disconnecting || closed {
            return;
        }
    }
}

async fn execute_actions<T: Transport>(
    transport: &mut T,
    actions: Vec<CoordinatorAction>,
) -> Result<(), TransportError> {
    for action in actions {
        match action {
            CoordinatorAction::SendFrame(frame) => {
                let channel = channel_for(&frame);
                let buf = encode_for_write(&frame, DEFAULT_MAX_FRAME_SIZE);
                transport.send(channel, buf).await?;
            },
            CoordinatorAction::Log { level, message } => log_line(level, &message),
            CoordinatorAction::CloseTransport { reason } => {
                tracing::info!(reason, "closing transport");
                return Err(TransportError::Disconnected);
            },
        }
    }
    Ok(())
}

fn log_line(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!("{message}"),
        LogLevel::Info => tracing::info!("{message}"),
        LogLevel::Warn => tracing::warn!("{message}"),
        LogLevel::Error => tracing::error!("{message}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration as StdDuration;

    use maptransfer_crypto::{keyed_digest_hex, sha256_hex};
    use maptransfer_engine::{AuthCapabilities, AuthConfig, SessionConfig, VerificationKey};
    use maptransfer_store::MemoryMapStore;
    use maptransfer_wire::{Compression, Frame, TransferMetadata, encode};

    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::transport::{Channel, LoopbackTransport};

    #[derive(Clone)]
    struct TestEnv {
        now: Arc<Mutex<StdDuration>>,
        next_random: Arc<Mutex<u8>>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self {
                now: Arc::new(Mutex::new(StdDuration::ZERO)),
                next_random: Arc::new(Mutex::new(0)),
            }
        }
    }

    impl Environment for TestEnv {
        type Instant = StdDuration;

        fn now(&self) -> Self::Instant {
            #[allow(clippy::unwrap_used)]
            *self.now.lock().unwrap()
        }

        fn elapsed(&self, earlier: Self::Instant, later: Self::Instant) -> StdDuration {
            later.saturating_sub(earlier)
        }

        fn sleep(&self, duration: StdDuration) -> impl std::future::Future<Output = ()> + Send {
            // Advance the logical clock by the requested duration so
            // rate-limit and window checks see real progress across ticks,
            // then yield with a short real sleep rather than waiting out
            // the full duration (the driving loop ticks every 100ms).
            #[allow(clippy::unwrap_used)]
            {
                *self.now.lock().unwrap() += duration;
            }
            tokio::time::sleep(Duration::from_millis(1))
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
                window: StdDuration::from_secs(30),
                max_attempts: 3,
                session_lifetime: StdDuration::from_secs(300),
                verification_key: VerificationKey::KeyedDigest(DEV_SECRET.to_vec()),
                capabilities: AuthCapabilities::default(),
            },
            session: SessionConfig { chunk_size: 8, require_signature: false, ..SessionConfig::default() },
        }
    }

    #[tokio::test]
    async fn full_handshake_and_transfer_over_the_driving_loop() {
        let env = TestEnv::new();
        let store = MemoryMapStore::new();
        let coordinator = SessionCoordinator::new(env.clone(), store.clone(), config());
        let (node_side, mut client_side) = LoopbackTransport::pair();

        let driving = tokio::spawn(run(env, coordinator, node_side));

        client_side
            .send(Channel::Auth, encode(&Frame::AuthRequest { client_id: "terminal-1".to_string() }))
            .await
            .expect("send auth_request");
        let (_, buf) = client_side.recv().await.expect("auth_challenge");
        let Frame::AuthChallenge { session_id, payload_hash, .. } =
            decode(&buf, DEFAULT_MAX_FRAME_SIZE).expect("decode")
        else {
            panic!("expected auth_challenge");
        };
        let payload_bytes = hex::decode(payload_hash).expect("hex");
        let signature = keyed_digest_hex(DEV_SECRET, &payload_bytes);
        client_side
            .send(Channel::Auth, encode(&Frame::AuthResponse { session_id, signature }))
            .await
            .expect("send auth_response");
        let (_, buf) = client_side.recv().await.expect("auth_success");
        assert!(matches!(decode(&buf, DEFAULT_MAX_FRAME_SIZE), Ok(Frame::AuthSuccess { .. })));

        let bytes = br#"{"metadata":{"version":1},"zones":[]}"#.to_vec();
        let metadata = TransferMetadata {
            file_size: bytes.len() as u64,
            file_hash: sha256_hex(&bytes),
            version: 1,
            signature: None,
            compression: Compression::None,
            compressed_size: None,
            compressed_hash: None,
        };
        client_side
            .send(Channel::Data, encode(&Frame::TransferInit { metadata }))
            .await
            .expect("send transfer_init");
        let (_, buf) = client_side.recv().await.expect("transfer_ready");
        let Frame::TransferReady { session_id, total_chunks, .. } =
            decode(&buf, DEFAULT_MAX_FRAME_SIZE).expect("decode")
        else {
            panic!("expected transfer_ready");
        };

        let mut completed = false;
        for index in 0..total_chunks {
            let start = index as usize * 8;
            let end = ((index as usize) + 1) * 8;
            let chunk = &bytes[start..end.min(bytes.len())];
            client_side
                .send(
                    Channel::Data,
                    encode(&Frame::ChunkData {
                        session_id,
                        chunk_index: index,
                        data: hex::encode(chunk),
                        checksum: None,
                    }),
                )
                .await
                .expect("send chunk_data");
            let (_, buf) = client_side.recv().await.expect("ack or complete");
            if matches!(decode(&buf, DEFAULT_MAX_FRAME_SIZE), Ok(Frame::TransferComplete { .. })) {
                completed = true;
            }
        }

        assert!(completed, "expected transfer_complete");
        assert_eq!(store.active_bytes().unwrap(), bytes);

        drop(client_side);
        driving.await.expect("driving loop task");
    }
}
