//! Meta-address display encoding.
//!
//! The published form of a meta-address is
//!
//! ```text
//! <prefix>:<base58(version || spend_pub || view_pub || checksum)>
//! ```
//!
//! where `prefix` names the chain (`btc`, `eth`) and `checksum` is the first
//! four bytes of `SHA256d(prefix || version || spend_pub || view_pub)`.
//! Binding the prefix into the checksum means a payload lifted onto another
//! chain's prefix fails to decode.
//!
//! Decoding is strict: every structural check runs before any curve
//! arithmetic, and every failure is reported as `InvalidMetaAddress` so a
//! caller pasting untrusted strings gets one error to handle.

use shroud_core::constants::{META_CHECKSUM_SIZE, META_PAYLOAD_SIZE};
use shroud_core::error::{Result, ShroudError};
use shroud_core::types::MetaAddress;
use shroud_core::Chain;

use crate::derive::point_from_key;
use crate::hash::sha256d;

/// Encodes a meta-address into its published string form.
pub fn encode_meta_address(meta: &MetaAddress) -> String {
    let prefix = meta.chain.meta_prefix();
    let body = meta.to_bytes();

    let mut payload = Vec::with_capacity(META_PAYLOAD_SIZE);
    payload.extend_from_slice(&body);
    payload.extend_from_slice(&checksum(prefix, &body));

    format!("{}:{}", prefix, bs58::encode(payload).into_string())
}

/// Decodes and fully validates a published meta-address string.
///
/// Validation order: chain prefix, base58 alphabet, payload length, version
/// byte, checksum, then curve membership of both public keys.
///
/// # Errors
/// `InvalidMetaAddress` describing the first check that failed.
pub fn decode_meta_address(encoded: &str) -> Result<MetaAddress> {
    let (prefix, body) = encoded
        .split_once(':')
        .ok_or_else(|| ShroudError::InvalidMetaAddress("missing chain prefix".into()))?;

    let chain = Chain::from_meta_prefix(prefix).ok_or_else(|| {
        ShroudError::InvalidMetaAddress(format!("unknown chain prefix '{prefix}'"))
    })?;

    let payload = bs58::decode(body)
        .into_vec()
        .map_err(|e| ShroudError::InvalidMetaAddress(format!("base58: {e}")))?;

    if payload.len() != META_PAYLOAD_SIZE {
        return Err(ShroudError::InvalidMetaAddress(format!(
            "payload is {} bytes, expected {}",
            payload.len(),
            META_PAYLOAD_SIZE
        )));
    }

    let (body_bytes, carried) = payload.split_at(META_PAYLOAD_SIZE - META_CHECKSUM_SIZE);
    if checksum(prefix, body_bytes) != carried {
        return Err(ShroudError::InvalidMetaAddress("checksum mismatch".into()));
    }

    let meta = MetaAddress::from_bytes(chain, body_bytes)?;

    // Structure is sound; now require both keys to be actual curve points.
    point_from_key(&meta.spending_public)
        .map_err(|e| ShroudError::InvalidMetaAddress(format!("spending key: {e}")))?;
    point_from_key(&meta.viewing_public)
        .map_err(|e| ShroudError::InvalidMetaAddress(format!("viewing key: {e}")))?;

    Ok(meta)
}

fn checksum(prefix: &str, body: &[u8]) -> [u8; META_CHECKSUM_SIZE] {
    let mut preimage = Vec::with_capacity(prefix.len() + body.len());
    preimage.extend_from_slice(prefix.as_bytes());
    preimage.extend_from_slice(body);

    let digest = sha256d(&preimage);
    let mut out = [0u8; META_CHECKSUM_SIZE];
    out.copy_from_slice(&digest[..META_CHECKSUM_SIZE]);
    out
}
