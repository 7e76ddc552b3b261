//! Payment records and their lifecycle.
//!
//! Incoming payments are identified by [`PaymentKey`] (chain, one-time
//! address, transaction hash) and move through exactly one state change:
//! unspent to spent. Outgoing payments follow the four-state machine in
//! [`OutgoingStatus`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::Chain;
use crate::error::{Result, ShroudError};
use crate::types::keys::{KeyPairId, StealthPublicKey};

// ═══════════════════════════════════════════════════════════════════════════════
// INCOMING PAYMENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Identity of an incoming payment record.
///
/// The same one-time address appearing in two different transactions is two
/// distinct payments; ingestion dedupes on this full triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentKey {
    /// Chain the payment landed on.
    pub chain: Chain,
    /// Chain-native one-time destination address.
    pub one_time_address: String,
    /// Hash of the funding transaction.
    pub tx_hash: String,
}

impl PaymentKey {
    /// Creates a payment key.
    pub fn new(chain: Chain, one_time_address: impl Into<String>, tx_hash: impl Into<String>) -> Self {
        Self {
            chain,
            one_time_address: one_time_address.into(),
            tx_hash: tx_hash.into(),
        }
    }
}

impl std::fmt::Display for PaymentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.chain, self.one_time_address, self.tx_hash)
    }
}

/// A detected incoming payment at a derived one-time address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StealthPayment {
    /// Identity triple (chain, one-time address, tx hash).
    pub key: PaymentKey,
    /// Amount in the chain's base denomination.
    #[serde(with = "crate::types::amount_str")]
    pub amount: u128,
    /// Sender's ephemeral public key, as carried by the transaction.
    pub ephemeral_public_key: StealthPublicKey,
    /// Output index used in the tweak derivation.
    pub output_index: u32,
    /// Key pair the payment was matched against.
    pub key_pair_id: KeyPairId,
    /// Height of the block containing the funding transaction.
    pub block_height: u64,
    /// When the scanner first detected the payment.
    pub detected_at: DateTime<Utc>,
    /// Whether the output has been consumed. Transitions false to true once.
    pub is_spent: bool,
    /// Free-form caller note.
    pub note: Option<String>,
}

/// Outcome of ingesting an incoming payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestOutcome {
    /// First sighting: a new record was created.
    Recorded,
    /// The payment key was already present; mutable fields were refreshed.
    AlreadyKnown,
}

/// Outcome of a spend mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpendOutcome {
    /// The record flipped from unspent to spent.
    MarkedSpent,
    /// The record was already spent; nothing changed.
    AlreadySpent,
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTGOING PAYMENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifier of an outgoing payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutgoingId(Uuid);

impl OutgoingId {
    /// Allocates a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying id.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OutgoingId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OutgoingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an outgoing payment.
///
/// Legal transitions: `Pending` to `Broadcast` or `Failed`, `Broadcast` to
/// `Confirmed` or `Failed`. `Confirmed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutgoingStatus {
    /// Created locally, not yet handed to the network.
    Pending,
    /// Accepted by the broadcast interface, awaiting confirmations.
    Broadcast,
    /// Confirmed on chain. Terminal.
    Confirmed,
    /// Rejected or timed out. Terminal.
    Failed,
}

impl OutgoingStatus {
    /// Returns true for terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutgoingStatus::Confirmed | OutgoingStatus::Failed)
    }

    /// Returns true if `next` is a legal transition target from this state.
    /// Self-transitions are not legal edges; callers treat them as no-ops.
    pub fn can_transition_to(&self, next: OutgoingStatus) -> bool {
        matches!(
            (self, next),
            (OutgoingStatus::Pending, OutgoingStatus::Broadcast)
                | (OutgoingStatus::Pending, OutgoingStatus::Failed)
                | (OutgoingStatus::Broadcast, OutgoingStatus::Confirmed)
                | (OutgoingStatus::Broadcast, OutgoingStatus::Failed)
        )
    }

    /// Stable lowercase name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutgoingStatus::Pending => "pending",
            OutgoingStatus::Broadcast => "broadcast",
            OutgoingStatus::Confirmed => "confirmed",
            OutgoingStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OutgoingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A sender-side stealth payment.
///
/// Created before any network action. Broadcasting is the host's job; the
/// outcome comes back through the payment store as a status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingPayment {
    /// Unique id of this payment.
    pub id: OutgoingId,
    /// Destination chain.
    pub chain: Chain,
    /// Derived one-time destination address.
    pub one_time_address: String,
    /// Amount in the chain's base denomination.
    #[serde(with = "crate::types::amount_str")]
    pub amount: u128,
    /// Ephemeral public key the transaction must carry.
    pub ephemeral_public_key: StealthPublicKey,
    /// Lifecycle state.
    pub status: OutgoingStatus,
    /// Free-form caller note.
    pub note: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last status change.
    pub updated_at: DateTime<Utc>,
}

impl OutgoingPayment {
    /// Creates a new pending payment.
    pub fn new(
        chain: Chain,
        one_time_address: impl Into<String>,
        amount: u128,
        ephemeral_public_key: StealthPublicKey,
        note: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OutgoingId::new(),
            chain,
            one_time_address: one_time_address.into(),
            amount,
            ephemeral_public_key,
            status: OutgoingStatus::Pending,
            note,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validates invariants that hold for every outgoing payment.
    pub fn validate(&self) -> Result<()> {
        if self.amount == 0 {
            return Err(ShroudError::InvalidAmount(self.amount));
        }
        if self.one_time_address.is_empty() {
            return Err(ShroudError::ValidationError(
                "one-time address is empty".into(),
            ));
        }
        Ok(())
    }
}
