//! In-process keystore.
//!
//! Production hosts bring their own [`Keystore`] (an OS keychain, an HSM, an
//! encrypted database); this one keeps material in process memory for
//! development and testing. Entries zeroize on drop.

use async_trait::async_trait;
use dashmap::DashMap;

use shroud_core::error::{Result, ShroudError};
use shroud_core::traits::Keystore;
use shroud_core::types::{KeyHandle, SecretScalar};

/// In-memory keystore.
///
/// Handles are the only way in or out: the map owns the scalars, `acquire`
/// hands back a scoped copy, and removal drops (and zeroizes) the original.
#[derive(Default)]
pub struct MemoryKeystore {
    entries: DashMap<KeyHandle, SecretScalar>,
}

impl MemoryKeystore {
    /// Creates an empty keystore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no material is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for MemoryKeystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeystore")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[async_trait]
impl Keystore for MemoryKeystore {
    /// Stores material under a handle, replacing any previous entry.
    async fn store(&self, handle: KeyHandle, material: SecretScalar) -> Result<()> {
        self.entries.insert(handle, material);
        Ok(())
    }

    /// Returns a scoped copy of the material behind a handle.
    async fn acquire(&self, handle: KeyHandle) -> Result<SecretScalar> {
        let entry = self.entries.get(&handle).ok_or_else(|| {
            ShroudError::KeystoreError(format!("no material behind handle {handle}"))
        })?;
        Ok(SecretScalar::from_array(*entry.as_array()))
    }

    /// Erases the material behind a handle. Idempotent.
    async fn erase(&self, handle: KeyHandle) -> Result<()> {
        self.entries.remove(&handle);
        Ok(())
    }

    async fn contains(&self, handle: KeyHandle) -> Result<bool> {
        Ok(self.entries.contains_key(&handle))
    }
}
