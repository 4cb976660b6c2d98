//! CRC32 checksums for log records
//!
//! Every record carries a checksum over its length prefix and body. Any
//! mismatch is corruption and halts decoding for the affected reader.

use crc32fast::Hasher;

/// Computes a CRC32 (IEEE) checksum over the provided bytes.
///
/// Deterministic: the same input always produces the same output.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verifies a stored checksum against the data it covers.
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_deterministic() {
        let data = b"change data capture record";
        assert_eq!(compute_checksum(data), compute_checksum(data));
    }

    #[test]
    fn test_checksum_detects_bit_flip() {
        let mut data = vec![0x10u8, 0x20, 0x30, 0x40];
        let original = compute_checksum(&data);
        data[1] ^= 0x01;
        assert_ne!(original, compute_checksum(&data));
    }

    #[test]
    fn test_verify_checksum() {
        let data = b"payload";
        let checksum = compute_checksum(data);
        assert!(verify_checksum(data, checksum));
        assert!(!verify_checksum(data, checksum ^ 1));
    }
}
