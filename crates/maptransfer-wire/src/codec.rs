//! Encoding/decoding frames to and from the transport's per-write buffers
//! (§4.1).

use maptransfer_crypto::checksum_hex;

use crate::error::WireError;
use crate::frame::Frame;

/// Default per-write size limit for both directions (§4.1, §6).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512;

/// Encode `frame` to a JSON buffer.
///
/// Encoding never fails for well-formed `Frame` values — `serde_json`
/// serialization of these plain data types cannot itself produce an error
/// (`String` keys, finite-enough numeric fields, no un-representable
/// floats in practice). Callers on the emission path are responsible for
/// truncating oversize status snapshots per §4.1 before calling this.
#[must_use]
pub fn encode(frame: &Frame) -> Vec<u8> {
    // `Frame` contains only strings, integers, enums, and a `Vec<u32>` —
    // none of serde_json's failure modes (non-finite floats, non-string
    // map keys) can occur here.
    #[allow(clippy::unwrap_used)]
    serde_json::to_vec(frame).unwrap()
}

/// Decode a raw per-write buffer into a [`Frame`].
///
/// Rejects the buffer before parsing if it exceeds `max_size` (cheapest
/// check first, mirroring the header-then-payload validation order the
/// binary framing in this workspace's sibling crates uses). For
/// `chunk_data` frames, also hex-decodes the payload and — if a
/// `checksum` field is present — recomputes it over the decoded bytes and
/// rejects a mismatch, per §4.1.
///
/// # Errors
///
/// - [`WireError::FrameTooLarge`] if `buf.len() > max_size`.
/// - [`WireError::Malformed`] if `buf` is not valid JSON or does not match
///   any `Frame` shape (including structurally valid JSON for a known
///   `type` missing a required field).
/// - [`WireError::UnknownType`] if the `type` tag is not recognized.
/// - [`WireError::InvalidEncoding`] if a `chunk_data` frame's `data` is not
///   strict lowercase/uppercase hex.
/// - [`WireError::ChecksumMismatch`] if a `chunk_data` frame's `checksum`
///   does not match the recomputed checksum of the decoded payload.
pub fn decode(buf: &[u8], max_size: usize) -> Result<Frame, WireError> {
    if buf.len() > max_size {
        return Err(WireError::FrameTooLarge { size: buf.len(), max: max_size });
    }

    let frame: Frame = serde_json::from_slice(buf).map_err(|e| {
        // serde's tagged-enum deserializer folds "unknown variant" into the
        // same error kind as other shape mismatches; distinguish by message
        // content so unknown-type gets its own wire error per §6
        // ("unknown `type` values rejected").
        let msg = e.to_string();
        if msg.contains("unknown variant") {
            WireError::UnknownType(extract_unknown_variant(&msg))
        } else {
            WireError::Malformed(msg)
        }
    })?;

    if let Frame::ChunkData { data, checksum, .. } = &frame {
        let decoded = decode_chunk_hex(data)?;
        if let Some(expected) = checksum {
            let computed = checksum_hex(&decoded);
            if !computed.eq_ignore_ascii_case(expected) {
                return Err(WireError::ChecksumMismatch);
            }
        }
    }

    Ok(frame)
}

/// Hex-decode a `chunk_data` frame's `data` field.
///
/// # Errors
///
/// [`WireError::InvalidEncoding`] if `data` contains any non-hex character
/// or has odd length.
pub fn decode_chunk_hex(data: &str) -> Result<Vec<u8>, WireError> {
    hex::decode(data).map_err(|_| WireError::InvalidEncoding)
}

/// Hex-encode raw chunk payload bytes for a `chunk_data` frame.
#[must_use]
pub fn encode_chunk_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Encode a frame destined for the client, truncating it if it would
/// exceed `max_size` (§4.1 "when a status snapshot exceeds the limit it is
/// truncated to its required subset (type, code, progress counters)").
///
/// Only [`Frame::ChunkAck`] carries a field (`missing_sample`) that can grow
/// the encoding past the limit; truncation drops it and keeps the rest.
/// Every other outbound frame is fixed-size enough in practice that this
/// is a no-op.
#[must_use]
pub fn encode_for_write(frame: &Frame, max_size: usize) -> Vec<u8> {
    let full = encode(frame);
    if full.len() <= max_size {
        return full;
    }
    if let Frame::ChunkAck { chunk_index, chunks_received, total_chunks, progress, .. } = frame {
        return encode(&Frame::ChunkAck {
            chunk_index: *chunk_index,
            chunks_received: *chunks_received,
            total_chunks: *total_chunks,
            progress: *progress,
            missing_sample: Vec::new(),
        });
    }
    full
}

fn extract_unknown_variant(msg: &str) -> String {
    // serde_json's message is like: `unknown variant \`foo\`, expected one of ...`
    msg.split('`').nth(1).unwrap_or("unknown").to_string()
}
