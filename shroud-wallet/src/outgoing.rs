//! Outgoing stealth payment creation (sender side).
//!
//! [`OutgoingPaymentBuilder`] turns a recipient's meta-address into a
//! recorded `Pending` payment carrying the derived one-time address and the
//! ephemeral key the transaction must publish. The engine never builds or
//! signs transactions; once the host has broadcast its own transaction,
//! [`report_broadcast`] feeds the acknowledgement back into the ledger.

use std::sync::Arc;

use tracing::{debug, warn};

use shroud_core::error::{Result, ShroudError};
use shroud_core::traits::{BroadcastAck, Broadcaster, PaymentStore};
use shroud_core::types::{OutgoingId, OutgoingPayment, OutgoingStatus};
use shroud_crypto::{compute_one_time_address, decode_meta_address};

/// Builder for sender-side stealth payments.
///
/// Decodes the recipient's meta-address, derives a fresh one-time
/// destination, and records the payment as `Pending`. Each build draws a new
/// ephemeral key, so repeated payments to the same recipient land on
/// unlinkable addresses.
pub struct OutgoingPaymentBuilder {
    ledger: Arc<dyn PaymentStore>,
    recipient: Option<String>,
    amount: Option<u128>,
    output_index: u32,
    note: Option<String>,
}

impl OutgoingPaymentBuilder {
    /// Starts a builder recording into the given ledger.
    pub fn new(ledger: Arc<dyn PaymentStore>) -> Self {
        Self {
            ledger,
            recipient: None,
            amount: None,
            output_index: 0,
            note: None,
        }
    }

    /// Recipient's encoded meta-address (`btc:...` or `eth:...`).
    pub fn recipient(mut self, meta_address: impl Into<String>) -> Self {
        self.recipient = Some(meta_address.into());
        self
    }

    /// Amount in the chain's base denomination.
    pub fn amount(mut self, amount: u128) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Output index folded into the derivation. Defaults to 0; senders
    /// placing several stealth outputs in one transaction give each its own
    /// index.
    pub fn output_index(mut self, index: u32) -> Self {
        self.output_index = index;
        self
    }

    /// Free-form note kept locally with the record.
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Derives the one-time destination and records the pending payment.
    pub async fn build(self) -> Result<OutgoingPayment> {
        let recipient = self.recipient.ok_or_else(|| {
            ShroudError::ValidationError("recipient meta-address is required".into())
        })?;
        let amount = self
            .amount
            .ok_or_else(|| ShroudError::ValidationError("amount is required".into()))?;
        if amount == 0 {
            return Err(ShroudError::InvalidAmount(0));
        }

        let meta = decode_meta_address(&recipient)?;
        let destination = compute_one_time_address(&meta, self.output_index)?;

        let payment = OutgoingPayment::new(
            meta.chain,
            destination.address,
            amount,
            destination.ephemeral_public_key,
            self.note,
        );
        let id = self.ledger.record_outgoing(payment.clone()).await?;

        debug!(%id, chain = %meta.chain, "Recorded pending stealth payment");
        Ok(payment)
    }
}

/// Reports the host's broadcast outcome for a pending payment.
///
/// Submits the host-assembled transaction through the injected broadcaster
/// and applies the matching status transition: accepted moves the payment to
/// `Broadcast`, rejected to `Failed`. Returns the updated record.
pub async fn report_broadcast(
    ledger: &dyn PaymentStore,
    broadcaster: &dyn Broadcaster,
    id: OutgoingId,
    raw_tx: &[u8],
) -> Result<OutgoingPayment> {
    let payment = ledger
        .find_outgoing(id)
        .await?
        .ok_or_else(|| ShroudError::PaymentNotFound(id.to_string()))?;

    match broadcaster.submit(payment.chain, raw_tx).await? {
        BroadcastAck::Accepted { tx_hash } => {
            debug!(%id, %tx_hash, "Broadcast accepted");
            ledger
                .update_outgoing_status(id, OutgoingStatus::Broadcast)
                .await
        }
        BroadcastAck::Rejected { reason } => {
            warn!(%id, %reason, "Broadcast rejected");
            ledger
                .update_outgoing_status(id, OutgoingStatus::Failed)
                .await
        }
    }
}
