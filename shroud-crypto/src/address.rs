//! Chain-native one-time address encodings.
//!
//! Each [`Chain`] variant has exactly one codec, selected by matching on the
//! enum. Both codecs consume the same derived secp256k1 point; only the
//! encoding differs:
//!
//! - UTXO family: P2PKH base58check over HASH160 of the compressed point
//! - account family: EIP-55 checksummed hex of Keccak-256 over the
//!   uncompressed point

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::ProjectivePoint;

use shroud_core::chain::Chain;

use crate::hash::{hash160, keccak256, sha256d};

/// Version byte of a mainnet pay-to-pubkey-hash address.
const P2PKH_VERSION: u8 = 0x00;

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN CODECS
// ═══════════════════════════════════════════════════════════════════════════════

/// Address codec for one chain family.
///
/// Implemented once per [`Chain`] variant; [`encode_address`] is the only
/// dispatch point.
pub trait ChainCodec {
    /// Encodes a derived one-time public key as a chain-native address.
    fn encode_address(point: &ProjectivePoint) -> String;
}

/// UTXO-family codec: base58check P2PKH.
pub struct BitcoinCodec;

impl ChainCodec for BitcoinCodec {
    fn encode_address(point: &ProjectivePoint) -> String {
        let compressed = point.to_affine().to_encoded_point(true);
        let digest = hash160(compressed.as_bytes());
        base58check(P2PKH_VERSION, &digest)
    }
}

/// Account-family codec: EIP-55 checksummed hex.
pub struct EthereumCodec;

impl ChainCodec for EthereumCodec {
    fn encode_address(point: &ProjectivePoint) -> String {
        let uncompressed = point.to_affine().to_encoded_point(false);
        // Keccak over the raw coordinates, without the 0x04 SEC1 tag
        let digest = keccak256(&uncompressed.as_bytes()[1..]);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&digest[12..]);
        to_eip55(&addr)
    }
}

/// Encodes a one-time public key as the chain's native address string.
pub fn encode_address(chain: Chain, point: &ProjectivePoint) -> String {
    match chain {
        Chain::Bitcoin => BitcoinCodec::encode_address(point),
        Chain::Ethereum => EthereumCodec::encode_address(point),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENCODING HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Base58check: version byte, payload, then 4 bytes of double SHA-256.
fn base58check(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len() + 4);
    data.push(version);
    data.extend_from_slice(payload);
    let checksum = sha256d(&data);
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

/// EIP-55 mixed-case checksum over a 20-byte address.
fn to_eip55(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let digest = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(2 + 40);
    out.push_str("0x");
    for (i, ch) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            digest[i / 2] >> 4
        } else {
            digest[i / 2] & 0x0f
        };
        if ch.is_ascii_alphabetic() && nibble >= 8 {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}
