//! Domain types for SHROUD.
//!
//! This module provides all the core data structures used throughout the engine:
//!
//! - [`StealthKeyPair`]: A recipient's dual-key identity on one chain
//! - [`MetaAddress`]: Decoded form of a published meta-address
//! - [`StealthPayment`]: A detected incoming payment at a one-time address
//! - [`OutgoingPayment`]: A sender-side payment and its lifecycle status
//! - [`TxCandidate`]: A transaction surfaced by the data source for matching
//! - [`ScanProgress`]: Per-chain scanner state

mod address;
mod candidate;
mod keys;
mod payment;
mod progress;

pub use address::*;
pub use candidate::*;
pub use keys::*;
pub use payment::*;
pub use progress::*;

// Serde adapter carrying u128 amounts as decimal strings: serde_json numbers
// cap at u64, which wei-denominated amounts overflow.
pub(crate) mod amount_str {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        amount: &u128,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
