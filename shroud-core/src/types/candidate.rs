//! Records the blockchain data source surfaces for scanning.
//!
//! The data source normalizes chain-specific transports (OP_RETURN payloads,
//! calldata, log topics) into [`TxCandidate`] values: the ephemeral public
//! key arrives already extracted, outputs are indexed the way the tweak
//! derivation expects.

use serde::{Deserialize, Serialize};

use crate::chain::Chain;
use crate::types::keys::StealthPublicKey;
use crate::types::payment::PaymentKey;

/// One output of a candidate transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateOutput {
    /// Output index within the transaction; input to the tweak derivation.
    pub index: u32,
    /// Chain-native destination address as observed on chain.
    pub address: String,
    /// Amount in the chain's base denomination.
    #[serde(with = "crate::types::amount_str")]
    pub amount: u128,
}

/// A transaction surfaced for stealth matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxCandidate {
    /// Transaction hash.
    pub tx_hash: String,
    /// Height of the containing block.
    pub block_height: u64,
    /// Ephemeral public key carried by the transaction.
    pub ephemeral_public_key: StealthPublicKey,
    /// Outputs to test against owned key pairs.
    pub outputs: Vec<CandidateOutput>,
}

/// Notice that a previously funded one-time output was consumed.
///
/// Spend detection is the same scan contract applied to outpoints: the triple
/// (chain, one-time address, funding tx hash) identifies the payment record
/// to flip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendNotice {
    /// Chain the spend happened on.
    pub chain: Chain,
    /// One-time address that was drained.
    pub one_time_address: String,
    /// Hash of the transaction that originally funded the output.
    pub tx_hash: String,
    /// Hash of the transaction that spent it.
    pub spent_in_tx: String,
    /// Height of the spending block.
    pub block_height: u64,
}

impl SpendNotice {
    /// Identity of the payment record this notice refers to.
    pub fn payment_key(&self) -> PaymentKey {
        PaymentKey::new(self.chain, self.one_time_address.clone(), self.tx_hash.clone())
    }
}
