//! Optional gzip decompression (§4.4 step 3).

use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::CryptoError;

/// Decompress `wire_bytes` as gzip, returning the canonical payload.
///
/// # Errors
///
/// Returns [`CryptoError::DecompressFailed`] on any malformed gzip stream
/// (bad header, truncated deflate block, CRC mismatch at the gzip framing
/// level). This is always terminal for the session per §4.4/§7
/// (`DecompressFailed`).
pub fn gzip_decompress(wire_bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut decoder = GzDecoder::new(wire_bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|e| CryptoError::DecompressFailed(e.to_string()))?;
    Ok(out)
}
