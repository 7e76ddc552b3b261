//! Dual-key stealth derivation.
//!
//! This module implements the core cryptographic operations: key-pair
//! generation, sender-side one-time address derivation, recipient-side
//! candidate matching, and one-time private key recovery.
//!
//! ## Derivation Flow
//!
//! ```text
//! sender:            r fresh, R = r·G
//! shared secret:     s = SHAKE256(DOMAIN_SHARED || compress(r·V))
//! per-output tweak:  t = SHAKE256(DOMAIN_TWEAK  || s || output_index)  mod n
//! one-time key:      P = S + t·G
//! ```
//!
//! The recipient computes the same `s` from `v·R` (ECDH commutativity) and
//! can spend with `p = s_priv + t (mod n)`, since `p·G = P`.

use k256::elliptic_curve::group::{Group, GroupEncoding};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::{Field, PrimeField};
use k256::{AffinePoint, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use shroud_core::chain::Chain;
use shroud_core::constants::{DOMAIN_SHARED_SECRET, DOMAIN_TWEAK, PUBLIC_KEY_SIZE, SECRET_SCALAR_SIZE};
use shroud_core::error::{Result, ShroudError};
use shroud_core::types::{MetaAddress, SecretScalar, StealthPublicKey};

use crate::address::encode_address;
use crate::hash::shake256_multi32;

// ═══════════════════════════════════════════════════════════════════════════════
// RESULT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Freshly generated dual-key material, before the keystore takes custody.
///
/// The secret halves are zeroized on drop; hand them to the keystore and
/// keep only the public halves.
pub struct GeneratedKeyPair {
    /// Spending secret scalar.
    pub spending: SecretScalar,
    /// Public half of the spending key.
    pub spending_public: StealthPublicKey,
    /// Viewing secret scalar.
    pub viewing: SecretScalar,
    /// Public half of the viewing key.
    pub viewing_public: StealthPublicKey,
}

impl std::fmt::Debug for GeneratedKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedKeyPair")
            .field("spending", &"[REDACTED]")
            .field("spending_public", &self.spending_public)
            .field("viewing", &"[REDACTED]")
            .field("viewing_public", &self.viewing_public)
            .finish()
    }
}

/// Sender-side derivation result: where to pay and what to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimeDestination {
    /// Chain-native one-time address.
    pub address: String,
    /// Ephemeral public key the transaction must carry.
    pub ephemeral_public_key: StealthPublicKey,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCALAR / POINT PLUMBING
// ═══════════════════════════════════════════════════════════════════════════════

/// Draws a uniform non-zero scalar from the OS entropy source.
///
/// Rejection-samples until the 32 bytes land below the curve order; a failed
/// entropy read surfaces as `InsufficientEntropy` instead of panicking.
fn random_scalar() -> Result<(Scalar, SecretScalar)> {
    let mut bytes = Zeroizing::new([0u8; SECRET_SCALAR_SIZE]);
    loop {
        OsRng
            .try_fill_bytes(bytes.as_mut())
            .map_err(|e| ShroudError::InsufficientEntropy(e.to_string()))?;

        let candidate: Option<Scalar> = Scalar::from_repr((*bytes).into()).into();
        if let Some(scalar) = candidate {
            if !bool::from(scalar.is_zero()) {
                return Ok((scalar, SecretScalar::from_array(*bytes)));
            }
        }
    }
}

/// Loads a stored secret as a curve scalar, rejecting zero and out-of-order
/// encodings.
fn scalar_from_secret(secret: &SecretScalar) -> Result<Scalar> {
    let candidate: Option<Scalar> = Scalar::from_repr((*secret.as_array()).into()).into();
    match candidate {
        Some(scalar) if !bool::from(scalar.is_zero()) => Ok(scalar),
        _ => Err(ShroudError::InvalidScalar(
            "secret is zero or exceeds the curve order".into(),
        )),
    }
}

/// Parses a compressed public key onto the curve.
pub(crate) fn point_from_key(key: &StealthPublicKey) -> Result<ProjectivePoint> {
    let affine: Option<AffinePoint> = AffinePoint::from_bytes(key.as_array().into()).into();
    let point = affine
        .map(ProjectivePoint::from)
        .ok_or_else(|| ShroudError::InvalidPublicKey(format!("{} is not on the curve", key.to_hex())))?;
    if bool::from(point.is_identity()) {
        return Err(ShroudError::PointAtInfinity);
    }
    Ok(point)
}

fn compress_point(point: &ProjectivePoint) -> StealthPublicKey {
    let encoded = point.to_affine().to_encoded_point(true);
    let mut bytes = [0u8; PUBLIC_KEY_SIZE];
    bytes.copy_from_slice(encoded.as_bytes());
    StealthPublicKey::from_array(bytes)
}

/// ECDH then hash: `s = SHAKE256(DOMAIN_SHARED || compress(scalar·point))`.
fn shared_secret(scalar: Scalar, point: ProjectivePoint) -> [u8; 32] {
    let shared_point = point * scalar;
    let compressed = compress_point(&shared_point);
    shake256_multi32(DOMAIN_SHARED_SECRET, &[compressed.as_bytes()])
}

/// Hash-to-scalar for the per-output tweak.
///
/// Deterministic on both sides: the retry counter starts at zero, so sender
/// and recipient reduce to the same scalar.
fn tweak_scalar(shared: &[u8; 32], output_index: u32) -> Scalar {
    let index_bytes = output_index.to_le_bytes();
    let mut counter: u8 = 0;
    loop {
        let digest = shake256_multi32(DOMAIN_TWEAK, &[shared.as_slice(), &index_bytes, &[counter]]);
        let candidate: Option<Scalar> = Scalar::from_repr(digest.into()).into();
        if let Some(scalar) = candidate {
            if !bool::from(scalar.is_zero()) {
                return scalar;
            }
        }
        counter = counter.wrapping_add(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEY GENERATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Public half of a stored secret: `secret·G`, compressed.
///
/// Used when re-importing backed-up scalars to rebuild (and verify) the
/// public keys.
pub fn derive_public_key(secret: &SecretScalar) -> Result<StealthPublicKey> {
    let scalar = scalar_from_secret(secret)?;
    Ok(compress_point(&(ProjectivePoint::GENERATOR * scalar)))
}

/// Generates independent spending and viewing key pairs.
///
/// # Errors
/// `InsufficientEntropy` if the OS entropy source fails.
pub fn generate_key_pair() -> Result<GeneratedKeyPair> {
    let (spend_scalar, spending) = random_scalar()?;
    let (view_scalar, viewing) = random_scalar()?;

    let spending_public = compress_point(&(ProjectivePoint::GENERATOR * spend_scalar));
    let viewing_public = compress_point(&(ProjectivePoint::GENERATOR * view_scalar));

    Ok(GeneratedKeyPair {
        spending,
        spending_public,
        viewing,
        viewing_public,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// SENDER SIDE
// ═══════════════════════════════════════════════════════════════════════════════

/// Derives a one-time destination with a caller-supplied ephemeral scalar.
///
/// Senders that must retain `r` (and deterministic tests) use this directly;
/// everyone else goes through [`compute_one_time_address`].
pub fn one_time_for_ephemeral(
    meta: &MetaAddress,
    ephemeral: &SecretScalar,
    output_index: u32,
) -> Result<OneTimeDestination> {
    meta.validate()?;
    let r = scalar_from_secret(ephemeral)?;
    let view_point = point_from_key(&meta.viewing_public)?;
    let spend_point = point_from_key(&meta.spending_public)?;

    let s = shared_secret(r, view_point);
    let t = tweak_scalar(&s, output_index);
    let one_time = spend_point + ProjectivePoint::GENERATOR * t;
    if bool::from(one_time.is_identity()) {
        return Err(ShroudError::PointAtInfinity);
    }

    Ok(OneTimeDestination {
        address: encode_address(meta.chain, &one_time),
        ephemeral_public_key: compress_point(&(ProjectivePoint::GENERATOR * r)),
    })
}

/// Derives a one-time destination with a fresh ephemeral key.
///
/// The ephemeral secret is dropped before returning; only its public half
/// survives, inside the destination.
pub fn compute_one_time_address(
    meta: &MetaAddress,
    output_index: u32,
) -> Result<OneTimeDestination> {
    let (_, ephemeral) = random_scalar()?;
    one_time_for_ephemeral(meta, &ephemeral, output_index)
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECIPIENT SIDE
// ═══════════════════════════════════════════════════════════════════════════════

/// Derives the candidate one-time address for one key pair and one observed
/// output.
///
/// Pure function of its inputs: the caller compares the result against the
/// observed address (use [`address_matches`] for a constant-time comparison)
/// and decides. Scanning loops call this for every owned key pair without
/// early exit.
pub fn match_candidate(
    chain: Chain,
    spending_public: &StealthPublicKey,
    viewing_secret: &SecretScalar,
    ephemeral_public: &StealthPublicKey,
    output_index: u32,
) -> Result<String> {
    let v = scalar_from_secret(viewing_secret)?;
    let ephemeral_point = point_from_key(ephemeral_public)?;
    let spend_point = point_from_key(spending_public)?;

    let s = shared_secret(v, ephemeral_point);
    let t = tweak_scalar(&s, output_index);
    let one_time = spend_point + ProjectivePoint::GENERATOR * t;
    if bool::from(one_time.is_identity()) {
        return Err(ShroudError::PointAtInfinity);
    }

    Ok(encode_address(chain, &one_time))
}

/// Recovers the private key controlling a detected one-time address:
/// `p = spending + t (mod n)`.
///
/// The result is zeroize-on-drop; callers pass it straight to signing and
/// let it fall out of scope.
pub fn recover_one_time_private_key(
    spending_secret: &SecretScalar,
    viewing_secret: &SecretScalar,
    ephemeral_public: &StealthPublicKey,
    output_index: u32,
) -> Result<SecretScalar> {
    let spend = scalar_from_secret(spending_secret)?;
    let view = scalar_from_secret(viewing_secret)?;
    let ephemeral_point = point_from_key(ephemeral_public)?;

    let s = shared_secret(view, ephemeral_point);
    let t = tweak_scalar(&s, output_index);
    let one_time = spend + t;
    if bool::from(one_time.is_zero()) {
        return Err(ShroudError::PointAtInfinity);
    }

    Ok(SecretScalar::from_array(one_time.to_bytes().into()))
}

/// Constant-time comparison of a derived candidate against an observed
/// address.
pub fn address_matches(derived: &str, observed: &str) -> bool {
    derived.as_bytes().ct_eq(observed.as_bytes()).into()
}
