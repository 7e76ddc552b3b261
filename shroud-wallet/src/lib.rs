//! # SHROUD Wallet
//!
//! Key-pair management and outgoing payment construction.
//!
//! This crate provides the recipient- and sender-side services around the
//! derivation engine:
//!
//! - [`Keyring`]: owns the stealth key pairs per chain, backed by an
//!   injected keystore for the secret halves
//! - [`MemoryKeystore`]: in-process keystore for development and testing
//! - [`OutgoingPaymentBuilder`]: derives a one-time destination and records
//!   the pending payment
//!
//! ## Example
//!
//! ```rust,ignore
//! use shroud_wallet::{Keyring, MemoryKeystore, ScanActivity};
//!
//! let keyring = Keyring::new(keystore, ledger, ScanActivity::new());
//!
//! // Generate a receiving identity and share its meta-address
//! let pair = keyring.generate(Chain::Bitcoin, Some("savings".into())).await?;
//! println!("{}", pair.meta_address);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod keyring;
pub mod keystore;
pub mod outgoing;

pub use keyring::{Keyring, ScanActivity};
pub use keystore::MemoryKeystore;
pub use outgoing::{report_broadcast, OutgoingPaymentBuilder};
