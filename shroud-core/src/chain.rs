//! Supported chain families.
//!
//! The engine is chain-closed: every supported chain is a variant of
//! [`Chain`], and chain-specific behavior (address encoding, denominations,
//! meta-address prefixes) is selected by matching on the variant. Adding a
//! chain means adding a variant and extending each `match`, which the
//! compiler enforces exhaustively.

use serde::{Deserialize, Serialize};

/// A chain family the engine can derive addresses for and scan.
///
/// `Bitcoin` stands in for the UTXO-style family (outputs, outpoints,
/// base58check addresses); `Ethereum` for the account-style family
/// (balances, hex addresses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// UTXO family: P2PKH base58check one-time addresses, 8 decimal places.
    Bitcoin,
    /// Account family: EIP-55 hex one-time addresses, 18 decimal places.
    Ethereum,
}

impl Chain {
    /// All supported chains, in scan order.
    pub const ALL: [Chain; 2] = [Chain::Bitcoin, Chain::Ethereum];

    /// The meta-address prefix, e.g. `btc` in `btc:3KduV2...`.
    pub fn meta_prefix(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "btc",
            Chain::Ethereum => "eth",
        }
    }

    /// Resolves a meta-address prefix back to its chain.
    pub fn from_meta_prefix(prefix: &str) -> Option<Chain> {
        Chain::ALL.into_iter().find(|c| c.meta_prefix() == prefix)
    }

    /// Number of decimal places in the chain's base denomination.
    pub fn decimals(&self) -> u32 {
        match self {
            Chain::Bitcoin => 8,
            Chain::Ethereum => 18,
        }
    }

    /// Ticker used when formatting amounts.
    pub fn unit(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "BTC",
            Chain::Ethereum => "ETH",
        }
    }

    /// Formats a base-denomination amount as a decimal string with ticker.
    ///
    /// Amounts are carried as integers in the chain's base unit (satoshi,
    /// wei); this is the only place they become human-readable.
    pub fn format_amount(&self, amount: u128) -> String {
        let scale = 10u128.pow(self.decimals());
        let whole = amount / scale;
        let frac = amount % scale;
        if frac == 0 {
            format!("{} {}", whole, self.unit())
        } else {
            let digits = format!("{:0width$}", frac, width = self.decimals() as usize);
            format!("{}.{} {}", whole, digits.trim_end_matches('0'), self.unit())
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Chain::Bitcoin => write!(f, "bitcoin"),
            Chain::Ethereum => write!(f, "ethereum"),
        }
    }
}
