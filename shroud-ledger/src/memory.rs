//! In-memory payment ledger.
//!
//! Fast, thread-safe storage suitable for development, testing,
//! and single-process deployments.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use shroud_core::chain::Chain;
use shroud_core::error::{Result, ShroudError};
use shroud_core::traits::PaymentStore;
use shroud_core::types::{
    IngestOutcome, KeyPairId, OutgoingId, OutgoingPayment, OutgoingStatus, PaymentKey,
    SpendOutcome, StealthPayment,
};

// ═══════════════════════════════════════════════════════════════════════════════
// STATS
// ═══════════════════════════════════════════════════════════════════════════════

/// Advisory counters over the ledger contents.
///
/// Updated alongside mutations; readers may observe a count mid-update, so
/// treat these as monitoring data, not invariants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Total incoming payments ever recorded.
    pub incoming_count: u64,
    /// Incoming payments not yet marked spent.
    pub unspent_count: u64,
    /// Total outgoing payments recorded.
    pub outgoing_count: u64,
    /// Outgoing payments that reached `Confirmed`.
    pub confirmed_count: u64,
    /// Outgoing payments that reached `Failed`.
    pub failed_count: u64,
}

impl LedgerStats {
    fn add_incoming(&mut self, payment: &StealthPayment) {
        self.incoming_count += 1;
        if !payment.is_spent {
            self.unspent_count += 1;
        }
    }

    fn note_spent(&mut self) {
        self.unspent_count = self.unspent_count.saturating_sub(1);
    }

    fn add_outgoing(&mut self) {
        self.outgoing_count += 1;
    }

    fn note_terminal(&mut self, status: OutgoingStatus) {
        match status {
            OutgoingStatus::Confirmed => self.confirmed_count += 1,
            OutgoingStatus::Failed => self.failed_count += 1,
            OutgoingStatus::Pending | OutgoingStatus::Broadcast => {}
        }
    }
}

/// Serializable dump of the ledger contents, for host-side persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// All incoming payments.
    pub incoming: Vec<StealthPayment>,
    /// All outgoing payments.
    pub outgoing: Vec<OutgoingPayment>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMORY LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory payment ledger.
///
/// Uses concurrent data structures for thread-safe access without
/// requiring external synchronization.
///
/// # Indexing
///
/// - Incoming payments: keyed by the full [`PaymentKey`] triple, so the same
///   one-time address funded by two transactions is two records
/// - Outgoing payments: keyed by [`OutgoingId`]
///
/// # Thread Safety
///
/// Mutations are serialized per logical record through the map's entry API:
/// concurrent recordings of one payment key collapse into a single record,
/// and spend/status updates never interleave.
#[derive(Debug)]
pub struct MemoryLedger {
    /// Incoming storage: payment key → payment
    incoming: DashMap<PaymentKey, StealthPayment>,
    /// Outgoing storage: id → payment
    outgoing: DashMap<OutgoingId, OutgoingPayment>,
    /// Ledger statistics
    stats: RwLock<LedgerStats>,
}

impl MemoryLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self {
            incoming: DashMap::new(),
            outgoing: DashMap::new(),
            stats: RwLock::new(LedgerStats::default()),
        }
    }

    /// Creates a ledger with preallocated capacity for incoming payments.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            incoming: DashMap::with_capacity(capacity),
            outgoing: DashMap::new(),
            stats: RwLock::new(LedgerStats::default()),
        }
    }

    /// Returns the current statistics.
    pub fn stats(&self) -> LedgerStats {
        self.stats.read().clone()
    }

    /// Clears all payments.
    pub fn clear(&self) {
        self.incoming.clear();
        self.outgoing.clear();
        *self.stats.write() = LedgerStats::default();
    }

    /// Returns true if the ledger holds no payments.
    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty() && self.outgoing.is_empty()
    }

    /// Exports the full ledger contents (for backup or host persistence).
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            incoming: self.incoming.iter().map(|e| e.value().clone()).collect(),
            outgoing: self.outgoing.iter().map(|e| e.value().clone()).collect(),
        }
    }

    /// Replaces the ledger contents from a snapshot.
    ///
    /// Returns the number of records restored. Statistics are recomputed
    /// from the snapshot.
    pub fn restore(&self, snapshot: LedgerSnapshot) -> Result<usize> {
        self.clear();

        let mut stats = LedgerStats::default();
        let mut restored = 0;

        for payment in snapshot.incoming {
            if payment.key.one_time_address.is_empty() {
                return Err(ShroudError::ValidationError(
                    "one-time address is empty".into(),
                ));
            }
            stats.add_incoming(&payment);
            self.incoming.insert(payment.key.clone(), payment);
            restored += 1;
        }

        for payment in snapshot.outgoing {
            payment.validate()?;
            stats.add_outgoing();
            if payment.status.is_terminal() {
                stats.note_terminal(payment.status);
            }
            self.outgoing.insert(payment.id, payment);
            restored += 1;
        }

        *self.stats.write() = stats;
        Ok(restored)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentStore for MemoryLedger {
    /// Ingests a detected incoming payment.
    ///
    /// Idempotent on the payment key. Re-ingestion refreshes `block_height`
    /// (reorgs move transactions) and leaves `is_spent` and `note` untouched;
    /// the entry API makes this race-free under concurrent scans.
    #[instrument(skip(self, payment), fields(chain = %payment.key.chain))]
    async fn record_incoming(&self, payment: StealthPayment) -> Result<IngestOutcome> {
        if payment.key.one_time_address.is_empty() {
            return Err(ShroudError::ValidationError(
                "one-time address is empty".into(),
            ));
        }

        match self.incoming.entry(payment.key.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().block_height = payment.block_height;
                debug!(key = %payment.key, "Refreshed known payment");
                Ok(IngestOutcome::AlreadyKnown)
            }
            Entry::Vacant(entry) => {
                self.stats.write().add_incoming(&payment);
                debug!(key = %payment.key, height = payment.block_height, "Recorded incoming payment");
                entry.insert(payment);
                Ok(IngestOutcome::Recorded)
            }
        }
    }

    /// Marks an incoming payment spent. One-way; already-spent is a no-op.
    #[instrument(skip(self))]
    async fn mark_spent(&self, key: &PaymentKey) -> Result<SpendOutcome> {
        let mut entry = self
            .incoming
            .get_mut(key)
            .ok_or_else(|| ShroudError::PaymentNotFound(key.to_string()))?;

        if entry.is_spent {
            return Ok(SpendOutcome::AlreadySpent);
        }

        entry.is_spent = true;
        self.stats.write().note_spent();
        debug!(key = %key, "Marked payment spent");
        Ok(SpendOutcome::MarkedSpent)
    }

    /// Stores a freshly built outgoing payment after validating it.
    #[instrument(skip(self, payment), fields(chain = %payment.chain))]
    async fn record_outgoing(&self, payment: OutgoingPayment) -> Result<OutgoingId> {
        payment.validate()?;

        let id = payment.id;
        self.stats.write().add_outgoing();
        debug!(id = %id, "Recorded outgoing payment");
        self.outgoing.insert(id, payment);
        Ok(id)
    }

    /// Applies a status transition.
    ///
    /// Same-state updates return the record unchanged; illegal edges
    /// (including anything out of a terminal state) are rejected.
    #[instrument(skip(self))]
    async fn update_outgoing_status(
        &self,
        id: OutgoingId,
        status: OutgoingStatus,
    ) -> Result<OutgoingPayment> {
        let mut entry = self
            .outgoing
            .get_mut(&id)
            .ok_or_else(|| ShroudError::PaymentNotFound(id.to_string()))?;

        if entry.status == status {
            return Ok(entry.clone());
        }

        if !entry.status.can_transition_to(status) {
            return Err(ShroudError::InvalidTransition {
                from: entry.status.as_str(),
                to: status.as_str(),
            });
        }

        entry.status = status;
        entry.updated_at = Utc::now();
        if status.is_terminal() {
            self.stats.write().note_terminal(status);
        }

        debug!(id = %id, status = %status, "Outgoing status updated");
        Ok(entry.clone())
    }

    /// All incoming payments on a chain, newest block first.
    #[instrument(skip(self))]
    async fn incoming(&self, chain: Chain) -> Result<Vec<StealthPayment>> {
        let mut payments: Vec<StealthPayment> = self
            .incoming
            .iter()
            .filter(|entry| entry.key().chain == chain)
            .map(|entry| entry.value().clone())
            .collect();

        payments.sort_by(|a, b| b.block_height.cmp(&a.block_height));
        Ok(payments)
    }

    /// Unspent incoming payments on a chain, newest block first.
    #[instrument(skip(self))]
    async fn unspent(&self, chain: Chain) -> Result<Vec<StealthPayment>> {
        let mut payments: Vec<StealthPayment> = self
            .incoming
            .iter()
            .filter(|entry| entry.key().chain == chain && !entry.value().is_spent)
            .map(|entry| entry.value().clone())
            .collect();

        payments.sort_by(|a, b| b.block_height.cmp(&a.block_height));
        Ok(payments)
    }

    /// Unspent incoming payments attributed to one key pair.
    #[instrument(skip(self))]
    async fn unspent_for_key_pair(&self, key_pair: KeyPairId) -> Result<Vec<StealthPayment>> {
        let mut payments: Vec<StealthPayment> = self
            .incoming
            .iter()
            .filter(|entry| entry.value().key_pair_id == key_pair && !entry.value().is_spent)
            .map(|entry| entry.value().clone())
            .collect();

        payments.sort_by(|a, b| b.block_height.cmp(&a.block_height));
        Ok(payments)
    }

    /// Looks up one incoming payment.
    #[instrument(skip(self))]
    async fn find_incoming(&self, key: &PaymentKey) -> Result<Option<StealthPayment>> {
        Ok(self.incoming.get(key).map(|entry| entry.clone()))
    }

    /// All outgoing payments on a chain, newest first.
    #[instrument(skip(self))]
    async fn outgoing(&self, chain: Chain) -> Result<Vec<OutgoingPayment>> {
        let mut payments: Vec<OutgoingPayment> = self
            .outgoing
            .iter()
            .filter(|entry| entry.value().chain == chain)
            .map(|entry| entry.value().clone())
            .collect();

        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    /// Looks up one outgoing payment.
    #[instrument(skip(self))]
    async fn find_outgoing(&self, id: OutgoingId) -> Result<Option<OutgoingPayment>> {
        Ok(self.outgoing.get(&id).map(|entry| entry.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_core::constants::PUBLIC_KEY_SIZE;
    use shroud_core::types::StealthPublicKey;

    fn ephemeral(fill: u8) -> StealthPublicKey {
        let mut bytes = [fill; PUBLIC_KEY_SIZE];
        bytes[0] = 0x02;
        StealthPublicKey::from_array(bytes)
    }

    fn incoming_payment(chain: Chain, address: &str, tx: &str, height: u64) -> StealthPayment {
        StealthPayment {
            key: PaymentKey::new(chain, address, tx),
            amount: 10_000,
            ephemeral_public_key: ephemeral(0x42),
            output_index: 0,
            key_pair_id: KeyPairId::new(),
            block_height: height,
            detected_at: Utc::now(),
            is_spent: false,
            note: None,
        }
    }

    fn outgoing_payment(chain: Chain) -> OutgoingPayment {
        OutgoingPayment::new(chain, "1BoatSLRHtKNngkdXEeobR76b53LETtpyT", 5_000, ephemeral(0x77), None)
    }

    #[tokio::test]
    async fn test_record_and_find() {
        let ledger = MemoryLedger::new();
        let payment = incoming_payment(Chain::Bitcoin, "addr1", "tx1", 100);
        let key = payment.key.clone();

        let outcome = ledger.record_incoming(payment).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Recorded);

        let found = ledger.find_incoming(&key).await.unwrap().unwrap();
        assert_eq!(found.block_height, 100);
        assert!(!found.is_spent);
    }

    #[tokio::test]
    async fn test_reingestion_is_idempotent() {
        let ledger = MemoryLedger::new();

        let mut first = incoming_payment(Chain::Bitcoin, "addr1", "tx1", 100);
        first.note = Some("gift".into());
        let key = first.key.clone();

        assert_eq!(
            ledger.record_incoming(first).await.unwrap(),
            IngestOutcome::Recorded
        );

        // Same triple at a different height: a reorg moved the block.
        let reorged = incoming_payment(Chain::Bitcoin, "addr1", "tx1", 103);
        assert_eq!(
            ledger.record_incoming(reorged).await.unwrap(),
            IngestOutcome::AlreadyKnown
        );

        let stored = ledger.find_incoming(&key).await.unwrap().unwrap();
        assert_eq!(stored.block_height, 103);
        assert_eq!(stored.note.as_deref(), Some("gift"));

        assert_eq!(ledger.incoming(Chain::Bitcoin).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reingestion_preserves_spent_flag() {
        let ledger = MemoryLedger::new();
        let payment = incoming_payment(Chain::Ethereum, "0xaa", "tx9", 50);
        let key = payment.key.clone();

        ledger.record_incoming(payment).await.unwrap();
        ledger.mark_spent(&key).await.unwrap();

        // A re-scan replays the same detection.
        let replay = incoming_payment(Chain::Ethereum, "0xaa", "tx9", 50);
        ledger.record_incoming(replay).await.unwrap();

        let stored = ledger.find_incoming(&key).await.unwrap().unwrap();
        assert!(stored.is_spent);
    }

    #[tokio::test]
    async fn test_mark_spent_is_one_way() {
        let ledger = MemoryLedger::new();
        let payment = incoming_payment(Chain::Bitcoin, "addr1", "tx1", 100);
        let key = payment.key.clone();
        ledger.record_incoming(payment).await.unwrap();

        assert_eq!(
            ledger.mark_spent(&key).await.unwrap(),
            SpendOutcome::MarkedSpent
        );
        assert_eq!(
            ledger.mark_spent(&key).await.unwrap(),
            SpendOutcome::AlreadySpent
        );
        assert!(ledger.find_incoming(&key).await.unwrap().unwrap().is_spent);
    }

    #[tokio::test]
    async fn test_mark_spent_unknown_key() {
        let ledger = MemoryLedger::new();
        let key = PaymentKey::new(Chain::Bitcoin, "nope", "tx0");
        let result = ledger.mark_spent(&key).await;
        assert!(matches!(result, Err(ShroudError::PaymentNotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_ingestion_collapses() {
        use std::sync::Arc;
        use tokio::task::JoinSet;

        let ledger = Arc::new(MemoryLedger::new());
        let mut tasks = JoinSet::new();

        // 50 concurrent scanners replaying the same detection
        for _ in 0..50 {
            let ledger = ledger.clone();
            tasks.spawn(async move {
                let payment = incoming_payment(Chain::Bitcoin, "addr1", "tx1", 100);
                ledger.record_incoming(payment).await.unwrap()
            });
        }

        let mut recorded = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap() == IngestOutcome::Recorded {
                recorded += 1;
            }
        }

        assert_eq!(recorded, 1);
        assert_eq!(ledger.incoming(Chain::Bitcoin).await.unwrap().len(), 1);
        assert_eq!(ledger.stats().incoming_count, 1);
    }

    #[tokio::test]
    async fn test_outgoing_lifecycle() {
        let ledger = MemoryLedger::new();
        let payment = outgoing_payment(Chain::Bitcoin);
        let id = ledger.record_outgoing(payment).await.unwrap();

        let broadcast = ledger
            .update_outgoing_status(id, OutgoingStatus::Broadcast)
            .await
            .unwrap();
        assert_eq!(broadcast.status, OutgoingStatus::Broadcast);
        assert!(broadcast.updated_at >= broadcast.created_at);

        let confirmed = ledger
            .update_outgoing_status(id, OutgoingStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed.status, OutgoingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_terminal_state_rejects_transitions() {
        let ledger = MemoryLedger::new();
        let id = ledger.record_outgoing(outgoing_payment(Chain::Bitcoin)).await.unwrap();

        ledger.update_outgoing_status(id, OutgoingStatus::Failed).await.unwrap();

        for next in [
            OutgoingStatus::Pending,
            OutgoingStatus::Broadcast,
            OutgoingStatus::Confirmed,
        ] {
            let result = ledger.update_outgoing_status(id, next).await;
            assert!(matches!(
                result,
                Err(ShroudError::InvalidTransition { from: "failed", .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_same_state_update_is_noop() {
        let ledger = MemoryLedger::new();
        let id = ledger.record_outgoing(outgoing_payment(Chain::Ethereum)).await.unwrap();

        ledger.update_outgoing_status(id, OutgoingStatus::Broadcast).await.unwrap();
        let first = ledger.find_outgoing(id).await.unwrap().unwrap();

        let again = ledger
            .update_outgoing_status(id, OutgoingStatus::Broadcast)
            .await
            .unwrap();
        assert_eq!(again.status, OutgoingStatus::Broadcast);
        assert_eq!(again.updated_at, first.updated_at);
    }

    #[tokio::test]
    async fn test_pending_cannot_skip_to_confirmed() {
        let ledger = MemoryLedger::new();
        let id = ledger.record_outgoing(outgoing_payment(Chain::Bitcoin)).await.unwrap();

        let result = ledger.update_outgoing_status(id, OutgoingStatus::Confirmed).await;
        assert!(matches!(
            result,
            Err(ShroudError::InvalidTransition {
                from: "pending",
                to: "confirmed",
            })
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_outgoing() {
        let ledger = MemoryLedger::new();
        let result = ledger
            .update_outgoing_status(OutgoingId::new(), OutgoingStatus::Broadcast)
            .await;
        assert!(matches!(result, Err(ShroudError::PaymentNotFound(_))));
    }

    #[tokio::test]
    async fn test_record_outgoing_rejects_zero_amount() {
        let ledger = MemoryLedger::new();
        let mut payment = outgoing_payment(Chain::Bitcoin);
        payment.amount = 0;
        let result = ledger.record_outgoing(payment).await;
        assert!(matches!(result, Err(ShroudError::InvalidAmount(0))));
    }

    #[tokio::test]
    async fn test_record_incoming_rejects_empty_address() {
        let ledger = MemoryLedger::new();
        let payment = incoming_payment(Chain::Bitcoin, "", "tx1", 100);
        let result = ledger.record_incoming(payment).await;
        assert!(matches!(result, Err(ShroudError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_queries_filter_by_chain_and_sort() {
        let ledger = MemoryLedger::new();
        ledger
            .record_incoming(incoming_payment(Chain::Bitcoin, "addr1", "tx1", 100))
            .await
            .unwrap();
        ledger
            .record_incoming(incoming_payment(Chain::Bitcoin, "addr2", "tx2", 300))
            .await
            .unwrap();
        ledger
            .record_incoming(incoming_payment(Chain::Ethereum, "0xaa", "tx3", 200))
            .await
            .unwrap();

        let btc = ledger.incoming(Chain::Bitcoin).await.unwrap();
        assert_eq!(btc.len(), 2);
        assert_eq!(btc[0].block_height, 300); // newest first
        assert_eq!(btc[1].block_height, 100);

        let eth = ledger.incoming(Chain::Ethereum).await.unwrap();
        assert_eq!(eth.len(), 1);
    }

    #[tokio::test]
    async fn test_unspent_excludes_spent() {
        let ledger = MemoryLedger::new();
        let a = incoming_payment(Chain::Bitcoin, "addr1", "tx1", 100);
        let b = incoming_payment(Chain::Bitcoin, "addr2", "tx2", 200);
        let spent_key = a.key.clone();

        ledger.record_incoming(a).await.unwrap();
        ledger.record_incoming(b).await.unwrap();
        ledger.mark_spent(&spent_key).await.unwrap();

        let unspent = ledger.unspent(Chain::Bitcoin).await.unwrap();
        assert_eq!(unspent.len(), 1);
        assert_eq!(unspent[0].key.one_time_address, "addr2");
    }

    #[tokio::test]
    async fn test_unspent_for_key_pair() {
        let ledger = MemoryLedger::new();
        let owner = KeyPairId::new();

        let mut mine = incoming_payment(Chain::Bitcoin, "addr1", "tx1", 100);
        mine.key_pair_id = owner;
        let theirs = incoming_payment(Chain::Bitcoin, "addr2", "tx2", 200);

        ledger.record_incoming(mine).await.unwrap();
        ledger.record_incoming(theirs).await.unwrap();

        let owned = ledger.unspent_for_key_pair(owner).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].key.one_time_address, "addr1");
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let ledger = MemoryLedger::new();
        ledger
            .record_incoming(incoming_payment(Chain::Bitcoin, "addr1", "tx1", 100))
            .await
            .unwrap();
        let id = ledger.record_outgoing(outgoing_payment(Chain::Ethereum)).await.unwrap();
        ledger.update_outgoing_status(id, OutgoingStatus::Broadcast).await.unwrap();

        let snapshot = ledger.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: LedgerSnapshot = serde_json::from_str(&json).unwrap();

        let restored = MemoryLedger::new();
        assert_eq!(restored.restore(parsed).unwrap(), 2);
        assert_eq!(restored.incoming(Chain::Bitcoin).await.unwrap().len(), 1);
        let outgoing = restored.find_outgoing(id).await.unwrap().unwrap();
        assert_eq!(outgoing.status, OutgoingStatus::Broadcast);
        assert_eq!(restored.stats().incoming_count, 1);
    }

    #[tokio::test]
    async fn test_stats_track_lifecycle() {
        let ledger = MemoryLedger::new();
        let payment = incoming_payment(Chain::Bitcoin, "addr1", "tx1", 100);
        let key = payment.key.clone();

        ledger.record_incoming(payment).await.unwrap();
        let id = ledger.record_outgoing(outgoing_payment(Chain::Bitcoin)).await.unwrap();
        ledger.update_outgoing_status(id, OutgoingStatus::Broadcast).await.unwrap();
        ledger.update_outgoing_status(id, OutgoingStatus::Confirmed).await.unwrap();
        ledger.mark_spent(&key).await.unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.incoming_count, 1);
        assert_eq!(stats.unspent_count, 0);
        assert_eq!(stats.outgoing_count, 1);
        assert_eq!(stats.confirmed_count, 1);
        assert_eq!(stats.failed_count, 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let ledger = MemoryLedger::new();
        ledger
            .record_incoming(incoming_payment(Chain::Bitcoin, "addr1", "tx1", 100))
            .await
            .unwrap();
        assert!(!ledger.is_empty());

        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(ledger.stats(), LedgerStats::default());
    }
}
