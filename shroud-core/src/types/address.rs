//! Meta-address structure.
//!
//! A meta-address is the recipient's published identity: the chain it lives
//! on plus the spending and viewing public keys. The display encoding
//! (prefix, base58, checksum) is the derivation layer's job; this type is the
//! decoded form.

use serde::{Deserialize, Serialize};

use crate::chain::Chain;
use crate::constants::{META_ADDRESS_VERSION, PUBLIC_KEY_SIZE};
use crate::error::{Result, ShroudError};
use crate::types::keys::StealthPublicKey;

/// Decoded dual-key meta-address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaAddress {
    /// Format version byte carried in the encoding.
    pub version: u8,
    /// Chain the recipient receives on.
    pub chain: Chain,
    /// Public half of the spending key.
    pub spending_public: StealthPublicKey,
    /// Public half of the viewing key.
    pub viewing_public: StealthPublicKey,
}

impl MetaAddress {
    /// Creates a meta-address at the current format version.
    pub fn new(
        chain: Chain,
        spending_public: StealthPublicKey,
        viewing_public: StealthPublicKey,
    ) -> Self {
        Self {
            version: META_ADDRESS_VERSION,
            chain,
            spending_public,
            viewing_public,
        }
    }

    /// Validates the version byte.
    pub fn validate(&self) -> Result<()> {
        if self.version != META_ADDRESS_VERSION {
            return Err(ShroudError::InvalidMetaAddress(format!(
                "unsupported version {}",
                self.version
            )));
        }
        Ok(())
    }

    /// Serializes the checksummed portion: version, spending key, viewing key.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + 2 * PUBLIC_KEY_SIZE);
        bytes.push(self.version);
        bytes.extend_from_slice(self.spending_public.as_bytes());
        bytes.extend_from_slice(self.viewing_public.as_bytes());
        bytes
    }

    /// Parses the checksummed portion produced by [`MetaAddress::to_bytes`].
    ///
    /// The chain is not part of the byte payload; it comes from the prefix of
    /// the display encoding.
    pub fn from_bytes(chain: Chain, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 1 + 2 * PUBLIC_KEY_SIZE {
            return Err(ShroudError::InvalidMetaAddress(format!(
                "payload is {} bytes, expected {}",
                bytes.len(),
                1 + 2 * PUBLIC_KEY_SIZE
            )));
        }
        let version = bytes[0];
        if version != META_ADDRESS_VERSION {
            return Err(ShroudError::InvalidMetaAddress(format!(
                "unsupported version {version}"
            )));
        }
        let spending_public = StealthPublicKey::from_bytes(&bytes[1..1 + PUBLIC_KEY_SIZE])
            .map_err(|e| ShroudError::InvalidMetaAddress(format!("spending key: {e}")))?;
        let viewing_public = StealthPublicKey::from_bytes(&bytes[1 + PUBLIC_KEY_SIZE..])
            .map_err(|e| ShroudError::InvalidMetaAddress(format!("viewing key: {e}")))?;

        Ok(Self {
            version,
            chain,
            spending_public,
            viewing_public,
        })
    }
}
