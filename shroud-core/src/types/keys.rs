//! Key types for SHROUD.
//!
//! This module defines the key structures used by the engine:
//!
//! - [`StealthPublicKey`]: Compressed secp256k1 public key (33 bytes)
//! - [`SecretScalar`]: Private scalar (32 bytes, zeroized on drop)
//! - [`KeyHandle`]: Opaque reference to key material held by the keystore
//! - [`StealthKeyPair`]: A recipient's dual-key identity on one chain

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::chain::Chain;
use crate::constants::{PUBLIC_KEY_SIZE, SECRET_SCALAR_SIZE};
use crate::error::{Result, ShroudError};

// ═══════════════════════════════════════════════════════════════════════════════
// PUBLIC KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// Compressed SEC1 secp256k1 public key.
///
/// Safe to share publicly: spending and viewing public keys travel inside
/// meta-addresses, ephemeral public keys travel inside transactions. Curve
/// membership is checked where the point is actually used; this type only
/// guarantees the encoding shape.
#[derive(Clone, PartialEq, Eq)]
pub struct StealthPublicKey {
    bytes: [u8; PUBLIC_KEY_SIZE],
}

impl StealthPublicKey {
    /// Creates a public key from raw bytes.
    ///
    /// # Errors
    /// Returns an error if the length is not `PUBLIC_KEY_SIZE` or the SEC1
    /// tag byte is not a compressed-point tag (0x02/0x03).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(ShroudError::InvalidKeySize {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes[0] != 0x02 && bytes[0] != 0x03 {
            return Err(ShroudError::InvalidPublicKey(format!(
                "unexpected SEC1 tag byte 0x{:02x}",
                bytes[0]
            )));
        }

        let mut arr = [0u8; PUBLIC_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Creates a public key from a fixed-size array.
    pub fn from_array(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the raw bytes of the public key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the public key as a fixed-size array reference.
    pub fn as_array(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.bytes
    }

    /// Returns the hex-encoded public key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Creates a public key from a hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for StealthPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only show first/last 4 bytes for readability
        write!(
            f,
            "StealthPublicKey({}...{})",
            hex::encode(&self.bytes[..4]),
            hex::encode(&self.bytes[PUBLIC_KEY_SIZE - 4..])
        )
    }
}

// Serde implementation that uses hex encoding
impl Serialize for StealthPublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for StealthPublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SECRET SCALAR
// ═══════════════════════════════════════════════════════════════════════════════

/// A secp256k1 secret scalar (big-endian, 32 bytes).
///
/// This is the only form in which private key material crosses the keystore
/// boundary. It is automatically zeroized when dropped and never serialized.
/// Never expose its bytes in logs or error messages.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretScalar {
    bytes: [u8; SECRET_SCALAR_SIZE],
}

impl SecretScalar {
    /// Creates a secret scalar from raw bytes.
    ///
    /// # Errors
    /// Returns an error if the length is not `SECRET_SCALAR_SIZE`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SECRET_SCALAR_SIZE {
            return Err(ShroudError::InvalidKeySize {
                expected: SECRET_SCALAR_SIZE,
                actual: bytes.len(),
            });
        }

        let mut arr = [0u8; SECRET_SCALAR_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Creates a secret scalar from a fixed-size array.
    pub fn from_array(bytes: [u8; SECRET_SCALAR_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the raw bytes of the scalar.
    ///
    /// # Security
    /// Handle the returned bytes carefully: do not log or expose them.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the scalar as a fixed-size array reference.
    pub fn as_array(&self) -> &[u8; SECRET_SCALAR_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SecretScalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose scalar content
        write!(f, "SecretScalar([REDACTED])")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEYSTORE HANDLES & IDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque handle to a secret scalar held by the keystore.
///
/// Records carry handles instead of key material; the scalar behind a handle
/// is only reachable through the keystore trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyHandle(Uuid);

impl KeyHandle {
    /// Allocates a fresh handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying opaque id.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for KeyHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a stealth key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPairId(Uuid);

impl KeyPairId {
    /// Allocates a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying id.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for KeyPairId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for KeyPairId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STEALTH KEY PAIR
// ═══════════════════════════════════════════════════════════════════════════════

/// A recipient's dual-key stealth identity on one chain.
///
/// Holds the public halves and keystore handles for the spending and viewing
/// keys, plus the published meta-address. The private scalars live behind the
/// handles; this record is safe to persist and display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StealthKeyPair {
    /// Unique id of this key pair.
    pub id: KeyPairId,
    /// Chain the pair derives addresses on.
    pub chain: Chain,
    /// Keystore handle of the spending secret.
    pub spending_key: KeyHandle,
    /// Public half of the spending key.
    pub spending_public: StealthPublicKey,
    /// Keystore handle of the viewing secret.
    pub viewing_key: KeyHandle,
    /// Public half of the viewing key.
    pub viewing_public: StealthPublicKey,
    /// Display-ready encoded meta-address.
    pub meta_address: String,
    /// User-assigned label.
    pub label: Option<String>,
    /// Whether this is the chain's default receiving identity.
    pub is_default: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl StealthKeyPair {
    /// Structural sanity check: the meta-address must carry this pair's
    /// chain prefix. Cryptographic consistency is the derivation layer's job.
    pub fn validate(&self) -> Result<()> {
        let expected = format!("{}:", self.chain.meta_prefix());
        if !self.meta_address.starts_with(&expected) {
            return Err(ShroudError::InvalidMetaAddress(format!(
                "expected prefix '{}'",
                self.chain.meta_prefix()
            )));
        }
        Ok(())
    }
}
