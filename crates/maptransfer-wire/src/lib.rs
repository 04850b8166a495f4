//! JSON wire frames for the map transfer protocol.
//!
//! Three logical channels — auth, data, status — share one `Frame` tagged
//! enum (§6). Each write is a standalone JSON object under a configurable
//! per-write size limit (default 512 bytes, [`DEFAULT_MAX_FRAME_SIZE`]);
//! there is no framing beyond "one write, one frame".
//!
//! # Components
//!
//! - [`frame`]: the `Frame` enum and its payload types.
//! - [`codec`]: encode/decode against raw per-write buffers, including hex
//!   chunk-payload decoding and checksum verification.
//! - [`session_id`]: the 128-bit session identifier type.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod error;
pub mod frame;
pub mod session_id;

pub use codec::{
    DEFAULT_MAX_FRAME_SIZE, decode, decode_chunk_hex, encode, encode_chunk_hex, encode_for_write,
};
pub use error::WireError;
pub use frame::{Compression, ControlCommand, Frame, ServerCapabilities, TransferMetadata};
pub use session_id::SessionId;
