//! Hashing utilities with domain separation.
//!
//! This module provides SHAKE256 (extendable-output function) with domain
//! separation for the derivation pipeline, plus the fixed-width digests the
//! chain-native address encodings need (Keccak-256, double SHA-256, HASH160).
//!
//! ## Domain Separation
//!
//! Each use of SHAKE256 in the protocol includes a unique domain separator:
//!
//! ```text
//! output = SHAKE256(len(domain) || domain || input, output_length)
//! ```
//!
//! This prevents cross-protocol attacks where the same input might be
//! used in different contexts.

use ripemd::Ripemd160;
use sha2::Sha256;
use sha3::{
    digest::{ExtendableOutput, Update, XofReader},
    Shake256,
};

// ═══════════════════════════════════════════════════════════════════════════════
// SHAKE256 FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Computes SHAKE256 with domain separation.
///
/// # Arguments
///
/// * `domain` - Domain separator bytes (unique per use case)
/// * `input` - Input data to hash
/// * `output_len` - Desired output length in bytes
pub fn shake256(domain: &[u8], input: &[u8], output_len: usize) -> Vec<u8> {
    let mut hasher = Shake256::default();

    // Domain separation: prepend domain with length prefix
    hasher.update(&(domain.len() as u32).to_le_bytes());
    hasher.update(domain);

    hasher.update(input);

    let mut reader = hasher.finalize_xof();
    let mut output = vec![0u8; output_len];
    reader.read(&mut output);

    output
}

/// Computes a 32-byte SHAKE256 digest over multiple inputs.
///
/// Each input is length-prefixed so distinct splits of the same
/// concatenation never collide.
pub fn shake256_multi32(domain: &[u8], inputs: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Shake256::default();

    hasher.update(&(domain.len() as u32).to_le_bytes());
    hasher.update(domain);

    for input in inputs {
        hasher.update(&(input.len() as u64).to_le_bytes());
        hasher.update(input);
    }

    let mut reader = hasher.finalize_xof();
    let mut output = [0u8; 32];
    reader.read(&mut output);

    output
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED-WIDTH DIGESTS (address encodings)
// ═══════════════════════════════════════════════════════════════════════════════

/// Computes Keccak-256 (used for account-chain addresses).
///
/// Note: Keccak-256 is NOT SHA3-256. They use different padding.
pub fn keccak256(input: &[u8]) -> [u8; 32] {
    use sha3::{Digest, Keccak256};

    let mut hasher = Keccak256::new();
    Digest::update(&mut hasher, input);
    hasher.finalize().into()
}

/// Computes double SHA-256 (base58check and meta-address checksums).
pub fn sha256d(input: &[u8]) -> [u8; 32] {
    use sha2::Digest;

    let first = Sha256::digest(input);
    Sha256::digest(first).into()
}

/// Computes HASH160: RIPEMD-160 over SHA-256 (UTXO-chain addresses).
pub fn hash160(input: &[u8]) -> [u8; 20] {
    use ripemd::Digest;

    let sha = Sha256::digest(input);
    Ripemd160::digest(sha).into()
}
