//! Per-chunk checksum (§3, `ChunkFrame.checksum`).
//!
//! CRC-32, not a security boundary — that role belongs to the wire and
//! canonical SHA-256 hashes and the ECDSA signature. This just catches
//! transmission errors on an individual chunk.

/// CRC-32 of `bytes`, returned as an 8-character lowercase hex string.
#[must_use]
pub fn checksum_hex(bytes: &[u8]) -> String {
    format!("{:08x}", crc32fast::hash(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(checksum_hex(b"hello"), checksum_hex(b"hello"));
    }

    #[test]
    fn differs_on_single_bit_flip() {
        assert_ne!(checksum_hex(b"hello"), checksum_hex(b"hellp"));
    }

    #[test]
    fn is_eight_hex_chars() {
        assert_eq!(checksum_hex(b"").len(), 8);
    }
}
