//! Protocol constants for SHROUD.
//!
//! All cryptographic sizes are derived from secp256k1 (SEC1 point encoding)
//! and the SHAKE256 derivation pipeline. These constants match the wire
//! layout of the meta-address codec exactly.

// ═══════════════════════════════════════════════════════════════════════════════
// SECP256K1 SIZES (SEC1)
// ═══════════════════════════════════════════════════════════════════════════════

/// Size of a compressed secp256k1 public key in bytes (0x02/0x03 prefix + x).
pub const PUBLIC_KEY_SIZE: usize = 33;

/// Size of an uncompressed secp256k1 public key in bytes (0x04 prefix + x + y).
pub const UNCOMPRESSED_KEY_SIZE: usize = 65;

/// Size of a secp256k1 secret scalar in bytes.
pub const SECRET_SCALAR_SIZE: usize = 32;

/// Size of the ECDH shared secret after hashing.
pub const SHARED_SECRET_SIZE: usize = 32;

// ═══════════════════════════════════════════════════════════════════════════════
// HASH OUTPUT SIZES
// ═══════════════════════════════════════════════════════════════════════════════

/// Size of a Keccak-256 digest.
pub const KECCAK256_SIZE: usize = 32;

/// Size of a HASH160 digest (RIPEMD-160 over SHA-256).
pub const HASH160_SIZE: usize = 20;

/// Size of an account-chain address in bytes (low 20 bytes of Keccak-256).
pub const ETH_ADDRESS_SIZE: usize = 20;

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN SEPARATORS
// ═══════════════════════════════════════════════════════════════════════════════
// Each SHAKE256 invocation uses a unique domain separator so outputs from
// different derivation steps never collide, even with identical inputs.

/// Domain separator for the ECDH shared-secret hash.
pub const DOMAIN_SHARED_SECRET: &[u8] = b"SHROUD_SHARED_V1";

/// Domain separator for the per-output tweak scalar.
pub const DOMAIN_TWEAK: &[u8] = b"SHROUD_TWEAK_V1";

// ═══════════════════════════════════════════════════════════════════════════════
// META-ADDRESS LAYOUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Current meta-address format version.
/// Increment when making breaking changes to the payload layout.
pub const META_ADDRESS_VERSION: u8 = 1;

/// Size of the meta-address checksum (truncated double SHA-256).
pub const META_CHECKSUM_SIZE: usize = 4;

/// Size of the base58-encoded meta-address payload before encoding:
/// version (1) + spending key (33) + viewing key (33) + checksum (4).
pub const META_PAYLOAD_SIZE: usize = 1 + PUBLIC_KEY_SIZE + PUBLIC_KEY_SIZE + META_CHECKSUM_SIZE;

// ═══════════════════════════════════════════════════════════════════════════════
// SCANNING
// ═══════════════════════════════════════════════════════════════════════════════

/// Default number of blocks fetched from the data source per batch.
pub const DEFAULT_SCAN_BATCH_BLOCKS: u64 = 500;

/// Upper bound on the per-batch block range.
pub const MAX_SCAN_BATCH_BLOCKS: u64 = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sec1_sizes() {
        // Compressed/uncompressed SEC1 encodings of secp256k1 points
        assert_eq!(PUBLIC_KEY_SIZE, 33);
        assert_eq!(UNCOMPRESSED_KEY_SIZE, 65);
        assert_eq!(SECRET_SCALAR_SIZE, 32);
    }

    #[test]
    fn test_meta_payload_size() {
        // version (1) + spending (33) + viewing (33) + checksum (4)
        assert_eq!(META_PAYLOAD_SIZE, 71);
    }

    #[test]
    fn test_domain_separators_unique() {
        let domains = [DOMAIN_SHARED_SECRET, DOMAIN_TWEAK];

        for (i, a) in domains.iter().enumerate() {
            for (j, b) in domains.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Domain separators must be unique");
                }
            }
        }
    }

    #[test]
    fn test_batch_bounds() {
        assert!(DEFAULT_SCAN_BATCH_BLOCKS <= MAX_SCAN_BATCH_BLOCKS);
    }
}
