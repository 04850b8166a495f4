//! End-to-end acceptance tests against a bare [`SessionCoordinator`] (§8's
//! six concrete scenarios). Each test builds a fresh coordinator, the way
//! §9 "global mutable state" calls for ("tests instantiate a fresh
//! coordinator per scenario") — there is nothing shared across tests.

use std::io::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use maptransfer_crypto::{keyed_digest_hex, sha256_hex};
use maptransfer_engine::{AuthCapabilities, AuthConfig, Environment, SessionConfig, VerificationKey};
use maptransfer_node::coordinator::{
    CoordinatorAction, CoordinatorConfig, CoordinatorEvent, SessionCoordinator,
};
use maptransfer_store::{MapStore, MemoryMapStore};
use maptransfer_wire::{Compression, Frame, SessionId, TransferMetadata};

const DEV_SECRET: &[u8] = b"e2e-dev-secret";

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

fn config(chunk_size: u32) -> CoordinatorConfig {
    CoordinatorConfig {
        server_id: "e2e-node".to_string(),
        auth: AuthConfig {
            window: Duration::from_secs(30),
            max_attempts: 3,
            session_lifetime: Duration::from_secs(300),
            verification_key: VerificationKey::KeyedDigest(DEV_SECRET.to_vec()),
            capabilities: AuthCapabilities::default(),
        },
        session: SessionConfig { chunk_size, require_signature: false, ..SessionConfig::default() },
    }
}

fn authenticate(coord: &mut SessionCoordinator<TestEnv, MemoryMapStore>) -> SessionId {
    let actions = coord.process_event(CoordinatorEvent::FrameReceived(Frame::AuthRequest {
        client_id: "terminal-e2e".to_string(),
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
    let actions = coord
        .process_event(CoordinatorEvent::FrameReceived(Frame::AuthResponse { session_id, signature }));
    assert!(
        actions.iter().any(|a| matches!(a, CoordinatorAction::SendFrame(Frame::AuthSuccess { .. }))),
        "expected auth_success"
    );
    session_id
}

fn uncompressed_metadata(bytes: &[u8], version: u64) -> TransferMetadata {
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

fn transfer_ready(actions: &[CoordinatorAction]) -> (SessionId, u32) {
    actions
        .iter()
        .find_map(|a| match a {
            CoordinatorAction::SendFrame(Frame::TransferReady { session_id, total_chunks, .. }) => {
                Some((*session_id, *total_chunks))
            },
            _ => None,
        })
        .expect("expected transfer_ready")
}

fn send_chunk(
    coord: &mut SessionCoordinator<TestEnv, MemoryMapStore>,
    env: &TestEnv,
    session_id: SessionId,
    index: u32,
    data: &[u8],
) -> Vec<CoordinatorAction> {
    env.advance(Duration::from_millis(200));
    coord.process_event(CoordinatorEvent::FrameReceived(Frame::ChunkData {
        session_id,
        chunk_index: index,
        data: hex::encode(data),
        checksum: None,
    }))
}

fn chunks_of(bytes: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    bytes.chunks(chunk_size).map(<[u8]>::to_vec).collect()
}

/// Scenario 1: happy path, uncompressed (§8).
#[test]
fn scenario_1_happy_path_uncompressed() {
    let env = TestEnv::new();
    let store = MemoryMapStore::new();
    let mut coord = SessionCoordinator::new(env.clone(), store.clone(), config(16));
    authenticate(&mut coord);

    let bytes = br#"{"metadata":{"version":42},"zones":[]}"#.to_vec();
    let actions = coord.process_event(CoordinatorEvent::FrameReceived(Frame::TransferInit {
        metadata: uncompressed_metadata(&bytes, 42),
    }));
    let (session_id, total_chunks) = transfer_ready(&actions);
    assert_eq!(total_chunks, bytes.len().div_ceil(16) as u32);

    let mut completed = false;
    for (index, chunk) in chunks_of(&bytes, 16).into_iter().enumerate() {
        let actions = send_chunk(&mut coord, &env, session_id, index as u32, &chunk);
        if actions
            .iter()
            .any(|a| matches!(a, CoordinatorAction::SendFrame(Frame::TransferComplete { new_version: 42, .. })))
        {
            completed = true;
        }
    }

    assert!(completed, "expected transfer_complete with new_version=42");
    assert_eq!(store.active_bytes().expect("installed"), bytes);
}

/// Scenario 2: out-of-order delivery (§8).
#[test]
fn scenario_2_out_of_order_delivery() {
    let env = TestEnv::new();
    let store = MemoryMapStore::new();
    let mut coord = SessionCoordinator::new(env.clone(), store.clone(), config(16));
    authenticate(&mut coord);

    let bytes = br#"{"metadata":{"version":42},"zones":[]}"#.to_vec();
    let actions = coord.process_event(CoordinatorEvent::FrameReceived(Frame::TransferInit {
        metadata: uncompressed_metadata(&bytes, 42),
    }));
    let (session_id, total_chunks) = transfer_ready(&actions);
    let chunks = chunks_of(&bytes, 16);
    assert_eq!(total_chunks as usize, chunks.len());

    let mut order: Vec<u32> = (0..total_chunks).collect();
    order.rotate_left(2);
    order.swap(0, 1);

    let mut completed = false;
    let mut last_progress = -1.0;
    for &index in &order {
        let actions = send_chunk(&mut coord, &env, session_id, index, &chunks[index as usize]);
        for action in &actions {
            if let CoordinatorAction::SendFrame(Frame::ChunkAck { progress, .. }) = action {
                assert!(*progress >= last_progress, "progress must be monotonic");
                last_progress = *progress;
            }
            if matches!(action, CoordinatorAction::SendFrame(Frame::TransferComplete { .. })) {
                completed = true;
            }
        }
    }

    assert!(completed, "expected transfer_complete despite out-of-order delivery");
    assert_eq!(store.active_bytes().expect("installed"), bytes);
}

/// Scenario 3: duplicate chunk (§8).
#[test]
fn scenario_3_duplicate_chunk_reports_unchanged_count() {
    let env = TestEnv::new();
    let mut coord = SessionCoordinator::new(env.clone(), MemoryMapStore::new(), config(16));
    authenticate(&mut coord);

    let bytes = br#"{"metadata":{"version":1},"zones":[]}"#.to_vec();
    let actions = coord.process_event(CoordinatorEvent::FrameReceived(Frame::TransferInit {
        metadata: uncompressed_metadata(&bytes, 1),
    }));
    let (session_id, _) = transfer_ready(&actions);
    let chunk = &chunks_of(&bytes, 16)[1];

    let actions = send_chunk(&mut coord, &env, session_id, 1, chunk);
    let first_count = actions
        .iter()
        .find_map(|a| match a {
            CoordinatorAction::SendFrame(Frame::ChunkAck { chunks_received, .. }) => Some(*chunks_received),
            _ => None,
        })
        .expect("first chunk acked");

    let actions = send_chunk(&mut coord, &env, session_id, 1, chunk);
    let second_count = actions
        .iter()
        .find_map(|a| match a {
            CoordinatorAction::SendFrame(Frame::ChunkAck { chunks_received, .. }) => Some(*chunks_received),
            _ => None,
        })
        .expect("duplicate chunk still acked");
    assert_eq!(first_count, second_count, "chunks_received must not double-count a duplicate");
}

/// Scenario 4: compressed path (§8).
#[test]
fn scenario_4_compressed_path_passes_through_decompressing() {
    let env = TestEnv::new();
    let store = MemoryMapStore::new();
    let mut coord = SessionCoordinator::new(env.clone(), store.clone(), config(4096));
    authenticate(&mut coord);

    let canonical = format!(r#"{{"metadata":{{"version":7}},"zones":[{}]}}"#, "0".repeat(200 * 1024))
        .into_bytes();

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&canonical).expect("gzip write");
    let wire_bytes = encoder.finish().expect("gzip finish");

    let metadata = TransferMetadata {
        file_size: canonical.len() as u64,
        file_hash: sha256_hex(&canonical),
        version: 7,
        signature: None,
        compression: Compression::Gzip,
        compressed_size: Some(wire_bytes.len() as u64),
        compressed_hash: Some(sha256_hex(&wire_bytes)),
    };
    let actions =
        coord.process_event(CoordinatorEvent::FrameReceived(Frame::TransferInit { metadata }));
    let (session_id, _) = transfer_ready(&actions);

    let mut completed = false;
    for (index, chunk) in chunks_of(&wire_bytes, 4096).into_iter().enumerate() {
        let actions = send_chunk(&mut coord, &env, session_id, index as u32, &chunk);
        if actions
            .iter()
            .any(|a| matches!(a, CoordinatorAction::SendFrame(Frame::TransferComplete { .. })))
        {
            completed = true;
        }
    }

    assert!(completed, "expected transfer_complete for the compressed path");
    assert_eq!(store.active_bytes().expect("installed"), canonical);
    assert_eq!(store.installed_version().expect("version"), 7);
}

/// Scenario 5: hash mismatch (§8).
#[test]
fn scenario_5_wire_hash_mismatch_leaves_store_untouched() {
    let env = TestEnv::new();
    let store = MemoryMapStore::new();
    let mut coord = SessionCoordinator::new(env.clone(), store.clone(), config(16));
    authenticate(&mut coord);

    let bytes = br#"{"metadata":{"version":3},"zones":[]}"#.to_vec();
    let actions = coord.process_event(CoordinatorEvent::FrameReceived(Frame::TransferInit {
        metadata: uncompressed_metadata(&bytes, 3),
    }));
    let (session_id, total_chunks) = transfer_ready(&actions);
    let mut chunks = chunks_of(&bytes, 16);
    // Corrupt one byte of chunk 3's content before it is sent, so the
    // assembled buffer no longer matches `metadata.file_hash`.
    let corrupt_index = 3.min(chunks.len() as u32 - 1);
    chunks[corrupt_index as usize][0] ^= 0xFF;

    let mut final_actions = Vec::new();
    for index in 0..total_chunks {
        final_actions = send_chunk(&mut coord, &env, session_id, index, &chunks[index as usize]);
    }

    assert!(
        final_actions.iter().any(|a| matches!(
            a,
            CoordinatorAction::SendFrame(Frame::TransferError { code, .. }) if code == "WireHashMismatch"
        )),
        "expected transfer_error{{code: WireHashMismatch}}"
    );
    assert!(store.active_bytes().is_none(), "active_path must be unchanged on failure");
    assert_eq!(store.installed_version().expect("version"), 0, "no version installed, no backup created");
}

/// Scenario 6: version regression (§8).
#[test]
fn scenario_6_version_regression_rejected_before_any_chunk() {
    let env = TestEnv::new();
    let store = MemoryMapStore::new();
    store.seed(10, b"{}".to_vec());
    let mut coord = SessionCoordinator::new(env, store.clone(), config(16));
    authenticate(&mut coord);

    let bytes = br#"{"metadata":{"version":10},"zones":[]}"#.to_vec();
    let actions = coord.process_event(CoordinatorEvent::FrameReceived(Frame::TransferInit {
        metadata: uncompressed_metadata(&bytes, 10),
    }));
    assert!(
        actions.iter().any(|a| matches!(
            a,
            CoordinatorAction::SendFrame(Frame::TransferError { code, .. }) if code == "VersionTooOld"
        )),
        "expected transfer_error{{code: VersionTooOld}}"
    );
    assert_eq!(store.active_bytes().expect("seeded"), b"{}");
}
