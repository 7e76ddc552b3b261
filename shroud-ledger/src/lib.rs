//! # SHROUD Ledger
//!
//! Payment persistence for the SHROUD engine.
//!
//! The ledger is the authoritative record of what the scanner detected and
//! what the wallet created:
//!
//! - **Incoming**: stealth payments matched against owned key pairs, keyed by
//!   (chain, one-time address, tx hash), with one-way spend marking
//! - **Outgoing**: sender-side payments moving through the
//!   `Pending → Broadcast → Confirmed/Failed` lifecycle
//!
//! ## Example
//!
//! ```rust,ignore
//! use shroud_ledger::{MemoryLedger, PaymentStore};
//!
//! let ledger = MemoryLedger::new();
//!
//! // Scanner feeds detections; re-scans are duplicate-free
//! let outcome = ledger.record_incoming(payment).await?;
//!
//! // Spending is monotone
//! ledger.mark_spent(&key).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod memory;

pub use memory::{LedgerSnapshot, LedgerStats, MemoryLedger};

// Re-export the trait from core
pub use shroud_core::traits::PaymentStore;
