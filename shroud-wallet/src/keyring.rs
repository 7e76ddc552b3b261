//! Stealth key pair management.
//!
//! The [`Keyring`] owns the set of [`StealthKeyPair`]s per chain. Secret
//! scalars go straight from generation into the injected [`Keystore`]; the
//! keyring holds only public halves and opaque handles. Deletion is
//! policy-gated against the payment ledger so funds cannot be orphaned.

use std::sync::Arc;

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use shroud_core::chain::Chain;
use shroud_core::error::{Result, ShroudError};
use shroud_core::traits::{Keystore, PaymentStore};
use shroud_core::types::{
    KeyHandle, KeyPairId, MetaAddress, SecretScalar, StealthKeyPair, StealthPayment,
};
use shroud_crypto::{
    derive_public_key, encode_meta_address, generate_key_pair, recover_one_time_private_key,
    GeneratedKeyPair,
};

// ═══════════════════════════════════════════════════════════════════════════════
// SCAN ACTIVITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared view of which chains currently have a scan in flight.
///
/// One instance is handed to both the keyring and the scanner at
/// construction: the scanner marks chains around its scan tasks, the keyring
/// refuses deletions while the chain's ledger view is still moving.
#[derive(Debug, Clone, Default)]
pub struct ScanActivity {
    active: Arc<DashSet<Chain>>,
}

impl ScanActivity {
    /// Creates a tracker with no active scans.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a chain as scanning.
    pub fn begin(&self, chain: Chain) {
        self.active.insert(chain);
    }

    /// Clears the scanning mark for a chain.
    pub fn end(&self, chain: Chain) {
        self.active.remove(&chain);
    }

    /// Returns true if a scan is in flight on the chain.
    pub fn is_scanning(&self, chain: Chain) -> bool {
        self.active.contains(&chain)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEYRING
// ═══════════════════════════════════════════════════════════════════════════════

/// Key pair manager.
///
/// Explicitly constructed with its collaborators; holds no global state.
/// All secret material lives behind the keystore, and every method that
/// touches it returns scoped copies the caller must drop promptly.
pub struct Keyring {
    keystore: Arc<dyn Keystore>,
    ledger: Arc<dyn PaymentStore>,
    scan_activity: ScanActivity,
    pairs: DashMap<KeyPairId, StealthKeyPair>,
    /// Serializes default-flag changes so each chain has at most one default.
    default_guard: Mutex<()>,
}

impl Keyring {
    /// Creates a keyring over the given collaborators.
    pub fn new(
        keystore: Arc<dyn Keystore>,
        ledger: Arc<dyn PaymentStore>,
        scan_activity: ScanActivity,
    ) -> Self {
        Self {
            keystore,
            ledger,
            scan_activity,
            pairs: DashMap::new(),
            default_guard: Mutex::new(()),
        }
    }

    /// Generates a fresh dual-key pair on a chain.
    ///
    /// The secret scalars are stored in the keystore before the record is
    /// published. The first pair on a chain becomes that chain's default.
    #[instrument(skip(self))]
    pub async fn generate(&self, chain: Chain, label: Option<String>) -> Result<StealthKeyPair> {
        let GeneratedKeyPair {
            spending,
            spending_public,
            viewing,
            viewing_public,
        } = generate_key_pair()?;

        let meta = MetaAddress::new(chain, spending_public.clone(), viewing_public.clone());
        let meta_address = encode_meta_address(&meta);

        let spending_key = KeyHandle::new();
        let viewing_key = KeyHandle::new();
        self.keystore.store(spending_key, spending).await?;
        self.keystore.store(viewing_key, viewing).await?;

        let mut pair = StealthKeyPair {
            id: KeyPairId::new(),
            chain,
            spending_key,
            spending_public,
            viewing_key,
            viewing_public,
            meta_address,
            label,
            is_default: false,
            created_at: Utc::now(),
        };

        {
            let _guard = self.default_guard.lock();
            pair.is_default = !self
                .pairs
                .iter()
                .any(|entry| entry.chain == chain && entry.is_default);
            self.pairs.insert(pair.id, pair.clone());
        }

        info!(id = %pair.id, chain = %chain, "Generated stealth key pair");
        Ok(pair)
    }

    /// Re-imports a key pair from backed-up secret scalars.
    ///
    /// Public halves and the meta-address are re-derived from the scalars.
    /// If the same identity is already present, the existing record is
    /// returned instead of a duplicate; concurrent restores of one identity
    /// collapse to a single record.
    #[instrument(skip(self, spending, viewing))]
    pub async fn restore(
        &self,
        chain: Chain,
        spending: SecretScalar,
        viewing: SecretScalar,
        label: Option<String>,
    ) -> Result<StealthKeyPair> {
        let spending_public = derive_public_key(&spending)?;
        let viewing_public = derive_public_key(&viewing)?;

        let meta = MetaAddress::new(chain, spending_public.clone(), viewing_public.clone());
        let meta_address = encode_meta_address(&meta);

        if let Some(existing) = self
            .pairs
            .iter()
            .find(|entry| entry.meta_address == meta_address)
        {
            return Ok(existing.clone());
        }

        let spending_key = KeyHandle::new();
        let viewing_key = KeyHandle::new();
        self.keystore.store(spending_key, spending).await?;
        self.keystore.store(viewing_key, viewing).await?;

        let mut pair = StealthKeyPair {
            id: KeyPairId::new(),
            chain,
            spending_key,
            spending_public,
            viewing_key,
            viewing_public,
            meta_address,
            label,
            is_default: false,
            created_at: Utc::now(),
        };

        // The check above ran before the keystore writes suspended; the
        // dedupe that counts shares the lock with the insert.
        let existing = {
            let _guard = self.default_guard.lock();
            match self
                .pairs
                .iter()
                .find(|entry| entry.meta_address == pair.meta_address)
            {
                Some(entry) => Some(entry.clone()),
                None => {
                    pair.is_default = !self
                        .pairs
                        .iter()
                        .any(|entry| entry.chain == chain && entry.is_default);
                    self.pairs.insert(pair.id, pair.clone());
                    None
                }
            }
        };

        if let Some(existing) = existing {
            // A concurrent restore of the same identity landed first
            self.keystore.erase(spending_key).await?;
            self.keystore.erase(viewing_key).await?;
            debug!(id = %existing.id, chain = %chain, "Restore collapsed into existing pair");
            return Ok(existing);
        }

        info!(id = %pair.id, chain = %chain, "Restored stealth key pair");
        Ok(pair)
    }

    /// Looks up one key pair.
    pub fn get(&self, id: KeyPairId) -> Result<StealthKeyPair> {
        self.pairs
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| ShroudError::KeyPairNotFound(id.to_string()))
    }

    /// Key pairs on a chain: default first, then newest.
    pub fn list(&self, chain: Chain) -> Vec<StealthKeyPair> {
        let mut pairs: Vec<StealthKeyPair> = self
            .pairs
            .iter()
            .filter(|entry| entry.chain == chain)
            .map(|entry| entry.clone())
            .collect();

        pairs.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then(b.created_at.cmp(&a.created_at))
        });
        pairs
    }

    /// The chain's default receiving identity, if any.
    pub fn default_pair(&self, chain: Chain) -> Option<StealthKeyPair> {
        self.pairs
            .iter()
            .find(|entry| entry.chain == chain && entry.is_default)
            .map(|entry| entry.clone())
    }

    /// Makes a pair its chain's default, clearing the previous default.
    #[instrument(skip(self))]
    pub fn set_default(&self, id: KeyPairId) -> Result<StealthKeyPair> {
        let _guard = self.default_guard.lock();

        let chain = self
            .pairs
            .get(&id)
            .map(|entry| entry.chain)
            .ok_or_else(|| ShroudError::KeyPairNotFound(id.to_string()))?;

        for mut entry in self.pairs.iter_mut() {
            if entry.chain == chain {
                entry.is_default = entry.id == id;
            }
        }

        debug!(id = %id, chain = %chain, "Default key pair changed");
        self.get(id)
    }

    /// Relabels a pair.
    #[instrument(skip(self, label))]
    pub fn rename(&self, id: KeyPairId, label: impl Into<String>) -> Result<StealthKeyPair> {
        let mut entry = self
            .pairs
            .get_mut(&id)
            .ok_or_else(|| ShroudError::KeyPairNotFound(id.to_string()))?;

        entry.label = Some(label.into());
        Ok(entry.clone())
    }

    /// Deletes a pair and erases its key material.
    ///
    /// Refused with `DeletionBlocked` while a scan is in flight on the
    /// pair's chain (the ledger view is still moving), and with
    /// `HasUnspentFunds` while any unspent payment is attributed to the
    /// pair. Neither guard is bypassable; the pair stays listed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: KeyPairId) -> Result<()> {
        let pair = self.get(id)?;

        if self.scan_activity.is_scanning(pair.chain) {
            return Err(ShroudError::DeletionBlocked(format!(
                "a scan is in flight on {}; retry once it settles",
                pair.chain
            )));
        }

        let unspent = self.ledger.unspent_for_key_pair(id).await?;
        if !unspent.is_empty() {
            return Err(ShroudError::HasUnspentFunds {
                key_pair: id.to_string(),
                count: unspent.len(),
            });
        }

        // A scan that started while the query ran invalidates its answer
        if self.scan_activity.is_scanning(pair.chain) {
            return Err(ShroudError::DeletionBlocked(format!(
                "a scan is in flight on {}; retry once it settles",
                pair.chain
            )));
        }

        self.keystore.erase(pair.spending_key).await?;
        self.keystore.erase(pair.viewing_key).await?;
        self.pairs.remove(&id);

        info!(id = %id, chain = %pair.chain, "Deleted stealth key pair");
        Ok(())
    }

    /// Viewing scalars for every pair on a chain, for the scanning loop.
    ///
    /// Scoped copies: the scanner drops them when the pass completes.
    pub async fn viewing_scalars(
        &self,
        chain: Chain,
    ) -> Result<Vec<(StealthKeyPair, SecretScalar)>> {
        let pairs = self.list(chain);
        let mut scalars = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let scalar = self.keystore.acquire(pair.viewing_key).await?;
            scalars.push((pair, scalar));
        }
        Ok(scalars)
    }

    /// One-time private key controlling a detected payment.
    ///
    /// For the host's signing flow. Scoped: drop as soon as the signature
    /// is produced.
    pub async fn spend_secret(&self, payment: &StealthPayment) -> Result<SecretScalar> {
        let pair = self.get(payment.key_pair_id)?;
        let spending = self.keystore.acquire(pair.spending_key).await?;
        let viewing = self.keystore.acquire(pair.viewing_key).await?;

        recover_one_time_private_key(
            &spending,
            &viewing,
            &payment.ephemeral_public_key,
            payment.output_index,
        )
    }
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field("pairs", &self.pairs.len())
            .finish()
    }
}
