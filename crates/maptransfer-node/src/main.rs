//! Map transfer node demo binary.
//!
//! There is no real BLE GATT transport in this workspace (§1: the BLE
//! transport itself is out of scope); this binary demonstrates the full
//! C2-C6 pipeline end to end over an in-process
//! [`maptransfer_node::LoopbackTransport`] instead of a real link, playing
//! both the node and the demo terminal sending one file.
//!
//! # Usage
//!
//! ```bash
//! maptransfer-node --map map.json --version 7 --config node.toml
//! ```

use std::path::PathBuf;

use clap::Parser;
use maptransfer_crypto::{keyed_digest_hex, sha256_hex};
use maptransfer_node::{
    Channel, LoopbackTransport, SessionCoordinator, SystemEnv, TransferConfig, run,
};
use maptransfer_store::FsMapStore;
use maptransfer_wire::{Compression, DEFAULT_MAX_FRAME_SIZE, Frame, TransferMetadata, decode, encode};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Map transfer node demo
#[derive(Parser, Debug)]
#[command(name = "maptransfer-node")]
#[command(about = "Map transfer protocol node, demonstrated over an in-process loopback transport")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Canonical map JSON file to demo-transfer to this node. Without this,
    /// the node starts and exits immediately with nothing to transfer.
    #[arg(long)]
    map: Option<PathBuf>,

    /// Version number to associate with the demo transfer.
    #[arg(long, default_value_t = 1)]
    version: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let mut config = match &args.config {
        Some(path) => TransferConfig::load_from_file(path)?,
        None => TransferConfig::default(),
    };

    let Some(map_path) = args.map else {
        tracing::info!("no --map given; nothing to transfer, exiting");
        return Ok(());
    };

    let bytes = std::fs::read(&map_path)?;
    let dev_secret = b"maptransfer-demo-secret".to_vec();
    if config.auth.required_signature {
        tracing::warn!(
            "--map demo only drives the development keyed-digest auth mode; overriding auth.required_signature"
        );
        config.auth.required_signature = false;
    }
    config.auth.dev_secret_hex = Some(hex::encode(&dev_secret));

    let coordinator_config = config.to_coordinator_config()?;
    let chunk_size = coordinator_config.session.chunk_size;
    let env = SystemEnv::new();
    let store = FsMapStore::new(config.active_path.clone(), config.backup_dir.clone())
        .with_max_backups(config.max_backups);
    let coordinator = SessionCoordinator::new(env.clone(), store, coordinator_config);

    let (node_side, client_side) = LoopbackTransport::pair();
    let driving = tokio::spawn(run(env, coordinator, node_side));

    run_demo_client(client_side, &dev_secret, &bytes, args.version, chunk_size).await?;

    driving.await?;
    Ok(())
}

async fn run_demo_client(
    mut transport: LoopbackTransport,
    dev_secret: &[u8],
    bytes: &[u8],
    version: u64,
    chunk_size: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    transport
        .send(Channel::Auth, encode(&Frame::AuthRequest { client_id: "demo-terminal".to_string() }))
        .await?;
    let (_, buf) = transport.recv().await.ok_or("node closed before issuing a challenge")?;
    let Frame::AuthChallenge { session_id, payload_hash, .. } = decode(&buf, DEFAULT_MAX_FRAME_SIZE)?
    else {
        return Err("expected auth_challenge".into());
    };
    let payload_bytes = hex::decode(payload_hash)?;
    let signature = keyed_digest_hex(dev_secret, &payload_bytes);
    transport.send(Channel::Auth, encode(&Frame::AuthResponse { session_id, signature })).await?;
    let (_, buf) = transport.recv().await.ok_or("node closed before confirming auth")?;
    match decode(&buf, DEFAULT_MAX_FRAME_SIZE)? {
        Frame::AuthSuccess { .. } => tracing::info!("authenticated"),
        Frame::AuthError { code, message } => {
            return Err(format!("auth rejected: {code}: {message}").into());
        },
        other => return Err(format!("unexpected frame after auth_response: {other:?}").into()),
    }

    let metadata = TransferMetadata {
        file_size: bytes.len() as u64,
        file_hash: sha256_hex(bytes),
        version,
        signature: None,
        compression: Compression::None,
        compressed_size: None,
        compressed_hash: None,
    };
    transport.send(Channel::Data, encode(&Frame::TransferInit { metadata })).await?;
    let (_, buf) = transport.recv().await.ok_or("node closed before transfer_ready")?;
    let (session_id, total_chunks) = match decode(&buf, DEFAULT_MAX_FRAME_SIZE)? {
        Frame::TransferReady { session_id, total_chunks, .. } => (session_id, total_chunks),
        Frame::TransferError { code, message, .. } => {
            return Err(format!("transfer_init rejected: {code}: {message}").into());
        },
        other => return Err(format!("unexpected frame after transfer_init: {other:?}").into()),
    };

    let chunk_size = chunk_size as usize;
    for index in 0..total_chunks {
        let start = index as usize * chunk_size;
        let end = (start + chunk_size).min(bytes.len());
        transport
            .send(
                Channel::Data,
                encode(&Frame::ChunkData {
                    session_id,
                    chunk_index: index,
                    data: hex::encode(&bytes[start..end]),
                    checksum: None,
                }),
            )
            .await?;
        let (_, buf) = transport.recv().await.ok_or("node closed mid-transfer")?;
        match decode(&buf, DEFAULT_MAX_FRAME_SIZE)? {
            Frame::TransferComplete { new_version, duration, .. } => {
                tracing::info!(new_version, duration, "transfer complete");
            },
            Frame::ChunkAck { chunks_received, total_chunks, .. } => {
                tracing::debug!(chunks_received, total_chunks, "chunk acked");
            },
            Frame::TransferError { code, message, .. } => {
                return Err(format!("transfer failed: {code}: {message}").into());
            },
            other => return Err(format!("unexpected frame mid-transfer: {other:?}").into()),
        }
    }

    Ok(())
}
