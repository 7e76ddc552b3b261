//! Collaborator interfaces for SHROUD.
//!
//! These traits define the seams between the engine and its host:
//! payment persistence, chain data, key custody, and broadcasting.
//! Every service in the engine is constructed with its collaborators
//! injected; nothing reaches for a global.

use async_trait::async_trait;

use crate::chain::Chain;
use crate::error::Result;
use crate::types::{
    IngestOutcome, KeyHandle, KeyPairId, OutgoingId, OutgoingPayment, OutgoingStatus, PaymentKey,
    SecretScalar, SpendNotice, SpendOutcome, StealthPayment, TxCandidate,
};

// ═══════════════════════════════════════════════════════════════════════════════
// PAYMENT STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Authoritative store of detected and created payments.
///
/// Implementations must serialize mutations per logical record: concurrent
/// recordings of the same [`PaymentKey`] collapse into one record, and
/// status/spend updates never interleave into an inconsistent state.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Ingests a detected incoming payment. Idempotent on the payment key:
    /// re-ingestion refreshes `block_height` (reorgs move transactions) and
    /// leaves `is_spent` and `note` untouched.
    async fn record_incoming(&self, payment: StealthPayment) -> Result<IngestOutcome>;

    /// Marks an incoming payment spent. One-way; already-spent is a no-op.
    async fn mark_spent(&self, key: &PaymentKey) -> Result<SpendOutcome>;

    /// Stores a freshly built outgoing payment.
    async fn record_outgoing(&self, payment: OutgoingPayment) -> Result<OutgoingId>;

    /// Applies a status transition and returns the updated record.
    ///
    /// Legal edges only (see [`OutgoingStatus::can_transition_to`]);
    /// same-state updates are idempotent no-ops.
    async fn update_outgoing_status(
        &self,
        id: OutgoingId,
        status: OutgoingStatus,
    ) -> Result<OutgoingPayment>;

    /// All incoming payments on a chain, newest block first.
    async fn incoming(&self, chain: Chain) -> Result<Vec<StealthPayment>>;

    /// Unspent incoming payments on a chain.
    async fn unspent(&self, chain: Chain) -> Result<Vec<StealthPayment>>;

    /// Unspent incoming payments attributed to one key pair.
    async fn unspent_for_key_pair(&self, key_pair: KeyPairId) -> Result<Vec<StealthPayment>>;

    /// Looks up one incoming payment.
    async fn find_incoming(&self, key: &PaymentKey) -> Result<Option<StealthPayment>>;

    /// All outgoing payments on a chain, newest first.
    async fn outgoing(&self, chain: Chain) -> Result<Vec<OutgoingPayment>>;

    /// Looks up one outgoing payment.
    async fn find_outgoing(&self, id: OutgoingId) -> Result<Option<OutgoingPayment>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION SOURCE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Read access to normalized chain data.
///
/// Implementations might wrap a full node, an indexer, or fixtures. Transport
/// details (where the ephemeral key rides, how outputs are indexed) are the
/// implementation's concern; candidates arrive normalized.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Current tip height of the chain.
    async fn tip_height(&self, chain: Chain) -> Result<u64>;

    /// Candidate transactions in the inclusive block range `[from, to]`.
    async fn candidates_in_range(
        &self,
        chain: Chain,
        from: u64,
        to: u64,
    ) -> Result<Vec<TxCandidate>>;

    /// Spends of previously funded one-time outputs in `[from, to]`.
    async fn spends_in_range(&self, chain: Chain, from: u64, to: u64)
        -> Result<Vec<SpendNotice>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEYSTORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Exclusive custody of secret scalars.
///
/// The engine hands scalars over right after generation and from then on
/// holds only [`KeyHandle`]s. `acquire` returns a scoped copy the caller
/// must drop as soon as the operation completes (the wrapper zeroizes
/// itself on drop).
#[async_trait]
pub trait Keystore: Send + Sync {
    /// Stores key material under a handle.
    async fn store(&self, handle: KeyHandle, material: SecretScalar) -> Result<()>;

    /// Retrieves a scoped copy of the material behind a handle.
    async fn acquire(&self, handle: KeyHandle) -> Result<SecretScalar>;

    /// Erases the material behind a handle.
    async fn erase(&self, handle: KeyHandle) -> Result<()>;

    /// Returns true if the handle has material.
    async fn contains(&self, handle: KeyHandle) -> Result<bool>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// BROADCASTER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of handing a transaction to the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastAck {
    /// The network accepted the transaction.
    Accepted {
        /// Hash assigned to the broadcast transaction.
        tx_hash: String,
    },
    /// The network rejected the transaction.
    Rejected {
        /// Rejection reason, as reported by the network.
        reason: String,
    },
}

/// Hands fully formed transactions to the network.
///
/// The engine never builds or signs transactions; hosts submit what they
/// assembled around the derived one-time address and ephemeral key, then
/// feed the ack back as an outgoing status transition.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submits a serialized transaction.
    async fn submit(&self, chain: Chain, payload: &[u8]) -> Result<BroadcastAck>;
}
