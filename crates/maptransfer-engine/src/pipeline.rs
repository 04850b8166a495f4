//! Integrity pipeline (C4, §4.4): reassemble, hash-verify, optionally
//! decompress, hash-verify again, structural check.
//!
//! Pure functions over owned buffers; no I/O. The coordinator is
//! responsible for handing the result to the atomic store (C5).

use maptransfer_crypto::{gzip_decompress, hashes_match, sha256_hex};
use maptransfer_wire::{Compression, TransferMetadata};
use thiserror::Error;

/// Failures from [`run`]. Every variant is terminal for the session (§4.4,
/// §7): no partial write ever reaches disk.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Assembled buffer length did not match the expected wire size.
    #[error("reassembled length {actual} does not match expected wire size {expected}")]
    ReassemblyLengthMismatch {
        /// Expected wire size.
        expected: u64,
        /// Actual assembled length.
        actual: u64,
    },
    /// SHA-256 of the wire bytes did not match `compressed_hash` (or
    /// `file_hash` when uncompressed).
    #[error("wire hash mismatch")]
    WireHashMismatch,
    /// Gzip decode of the wire bytes failed.
    #[error("decompression failed: {0}")]
    DecompressFailed(String),
    /// SHA-256 of the decompressed bytes did not match `file_hash`.
    #[error("canonical hash mismatch")]
    CanonicalHashMismatch,
    /// Canonical bytes did not parse as the minimal required JSON shape.
    #[error("structural check failed: {0}")]
    StructuralInvalid(String),
}

impl PipelineError {
    /// Stable wire error code (§7).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ReassemblyLengthMismatch { .. } => "ReassemblyLengthMismatch",
            Self::WireHashMismatch => "WireHashMismatch",
            Self::DecompressFailed(_) => "DecompressFailed",
            Self::CanonicalHashMismatch => "CanonicalHashMismatch",
            Self::StructuralInvalid(_) => "StructuralInvalid",
        }
    }

    /// Every pipeline failure is terminal for the session.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        false
    }
}

/// Intermediate stage the pipeline passed through when it finished, for
/// progress reporting (mirrors the `Validating`/`Decompressing` states).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Only a wire-hash check ran (uncompressed transfer).
    WireHashOnly,
    /// Wire-hash check, decompression, and canonical-hash check all ran.
    Decompressed,
}

/// Canonical bytes ready for the atomic store, plus which stages ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    /// The decompressed, to-be-installed payload.
    pub canonical_bytes: Vec<u8>,
    /// Which stages this run exercised.
    pub stage: Stage,
}

/// Run the full integrity pipeline over an assembled wire buffer (§4.4).
///
/// Steps, in order: reassembly-length check (already implicit in the
/// caller having assembled exactly `wire_size` bytes, re-asserted here
/// defensively), wire hash, optional decompression, canonical hash,
/// structural check.
pub fn run(wire_bytes: &[u8], metadata: &TransferMetadata) -> Result<PipelineOutput, PipelineError> {
    let expected_wire_size = match metadata.compression {
        Compression::None => metadata.file_size,
        Compression::Gzip => metadata.compressed_size.unwrap_or(metadata.file_size),
    };
    let actual_len = wire_bytes.len() as u64;
    if actual_len != expected_wire_size {
        return Err(PipelineError::ReassemblyLengthMismatch {
            expected: expected_wire_size,
            actual: actual_len,
        });
    }

    let expected_wire_hash = match metadata.compression {
        Compression::None => &metadata.file_hash,
        Compression::Gzip => metadata.compressed_hash.as_ref().unwrap_or(&metadata.file_hash),
    };
    let wire_hash = sha256_hex(wire_bytes);
    if !hashes_match(&wire_hash, expected_wire_hash) {
        return Err(PipelineError::WireHashMismatch);
    }

    let (canonical_bytes, stage) = match metadata.compression {
        Compression::None => (wire_bytes.to_vec(), Stage::WireHashOnly),
        Compression::Gzip => {
            let decompressed = gzip_decompress(wire_bytes)
                .map_err(|e| PipelineError::DecompressFailed(e.to_string()))?;
            (decompressed, Stage::Decompressed)
        },
    };

    let canonical_hash = sha256_hex(&canonical_bytes);
    if !hashes_match(&canonical_hash, &metadata.file_hash) {
        return Err(PipelineError::CanonicalHashMismatch);
    }

    check_structure(&canonical_bytes)?;

    Ok(PipelineOutput { canonical_bytes, stage })
}

/// Parse as UTF-8 JSON and require a `metadata.version` integer and a
/// `zones` array (§4.4 step 5). No deeper schema validation is in scope.
fn check_structure(bytes: &[u8]) -> Result<(), PipelineError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| PipelineError::StructuralInvalid(format!("not valid UTF-8: {e}")))?;
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| PipelineError::StructuralInvalid(format!("not valid JSON: {e}")))?;

    let has_version =
        value.pointer("/metadata/version").is_some_and(serde_json::Value::is_i64)
            || value.pointer("/metadata/version").is_some_and(serde_json::Value::is_u64);
    if !has_version {
        return Err(PipelineError::StructuralInvalid(
            "missing integer metadata.version".to_string(),
        ));
    }
    if !value.get("zones").is_some_and(serde_json::Value::is_array) {
        return Err(PipelineError::StructuralInvalid("missing zones array".to_string()));
    }
    Ok(())
}
