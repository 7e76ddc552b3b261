//! # SHROUD Core
//!
//! Core types, errors, and traits for the SHROUD dual-key stealth address engine.
//!
//! This crate provides the foundational building blocks used by all other SHROUD crates:
//!
//! - **Types**: Domain models for key pairs, payments, scan candidates, and progress
//! - **Chain**: The closed set of supported chain families and their display rules
//! - **Errors**: Comprehensive error types with context
//! - **Constants**: Protocol constants and sizes
//! - **Traits**: Interfaces for the keystore, data source, payment store, and broadcaster
//!
//! ## Example
//!
//! ```rust
//! use shroud_core::{Chain, OutgoingStatus};
//!
//! assert_eq!(Chain::Bitcoin.meta_prefix(), "btc");
//! assert_eq!(Chain::Ethereum.format_amount(1_500_000_000_000_000_000), "1.5 ETH");
//! assert!(OutgoingStatus::Pending.can_transition_to(OutgoingStatus::Broadcast));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod chain;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use chain::Chain;
pub use constants::*;
pub use error::{Result, ShroudError};
pub use traits::*;
pub use types::*;
