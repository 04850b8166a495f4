//! Byte-duplex transport trait standing in for the BLE GATT link (§6
//! "Transport contract"), plus an in-process loopback implementation for
//! tests and the CLI demo binary.
//!
//! This is *not* the BLE transport — that stays out of scope as a feature
//! (§1). It is the minimal contract-shaped stand-in the coordinator is
//! wired against: any concrete realization of a byte-duplex transport can
//! sit behind it without the coordinator changing.

use std::future::Future;

use thiserror::Error;

/// The three logical write channels the transport contract guarantees
/// (§6): each carries opaque per-write buffers, in order, independently of
/// the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Challenge/response handshake frames.
    Auth,
    /// Transfer lifecycle and chunk frames.
    Data,
    /// Progress/status snapshots and acks.
    Status,
}

/// Failures from a [`Transport`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer disconnected; no further writes are possible.
    #[error("transport disconnected")]
    Disconnected,
}

/// A byte-duplex transport across the three logical channels (§6).
///
/// Implementations deliver opaque per-write buffers with no
/// interpretation — the transport performs no parsing; that is
/// [`maptransfer_wire::codec`]'s job one layer up. Uses `impl Future`
/// return types directly so no `async_trait` dependency is needed.
pub trait Transport: Send {
    /// Wait for the next inbound write on any channel. Resolves to `None`
    /// when the peer disconnects.
    fn recv(&mut self) -> impl Future<Output = Option<(Channel, Vec<u8>)>> + Send;

    /// Send one write on `channel`.
    ///
    /// # Errors
    ///
    /// [`TransportError::Disconnected`] if the peer is gone.
    fn send(
        &mut self,
        channel: Channel,
        buf: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// In-process duplex transport built on `tokio::sync::mpsc`, used by the
/// integration tests and the CLI demo binary in place of a real BLE GATT
/// link.
pub struct LoopbackTransport {
    inbound: tokio::sync::mpsc::UnboundedReceiver<(Channel, Vec<u8>)>,
    outbound: tokio::sync::mpsc::UnboundedSender<(Channel, Vec<u8>)>,
}

impl LoopbackTransport {
    /// Build a connected pair: `(node_side, client_side)`. Writes sent on
    /// one side arrive as reads on the other.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (to_node, from_client) = tokio::sync::mpsc::unbounded_channel();
        let (to_client, from_node) = tokio::sync::mpsc::unbounded_channel();
        (
            Self { inbound: from_client, outbound: to_client },
            Self { inbound: from_node, outbound: to_node },
        )
    }
}

impl Transport for LoopbackTransport {
    async fn recv(&mut self) -> Option<(Channel, Vec<u8>)> {
        self.inbound.recv().await
    }

    async fn send(&mut self, channel: Channel, buf: Vec<u8>) -> Result<(), TransportError> {
        self.outbound.send((channel, buf)).map_err(|_| TransportError::Disconnected)
    }
}
