//! # SHROUD Cryptography
//!
//! The stateless derivation engine for the SHROUD dual-key stealth address
//! protocol, built on secp256k1.
//!
//! This crate provides:
//!
//! - **Key generation**: independent spending and viewing scalars
//! - **Meta-addresses**: the prefix-tagged, checksummed display codec
//! - **Derivation**: one-time addresses from ECDH shared secrets and tweaks
//! - **Matching**: candidate derivation for the scanning loop
//! - **Recovery**: the one-time private key for a detected payment
//!
//! ## Derivation Flow
//!
//! ```text
//! sender:    r fresh, R = r·G
//!            s = SHAKE256(DOMAIN_SHARED || compress(r·V))
//!            t = SHAKE256(DOMAIN_TWEAK  || s || index)  (reduced mod n)
//!            P = S + t·G, address = encode_chain(P)
//!
//! recipient: s = SHAKE256(DOMAIN_SHARED || compress(v·R))   (same s)
//!            p = s_priv + t (mod n), so p·G = P
//! ```
//!
//! where `(S, V)` are the meta-address keys and `(s_priv, v)` their scalars.
//!
//! ## Security Properties
//!
//! - Secret scalars ride in zeroize-on-drop wrappers and never serialize
//! - Candidate comparison is constant-time (`subtle`)
//! - Domain separators keep the shared-secret and tweak hashes disjoint

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod address;
pub mod derive;
pub mod hash;
pub mod meta;

// Re-export main functions at crate root
pub use address::encode_address;
pub use derive::{
    address_matches, compute_one_time_address, derive_public_key, generate_key_pair,
    match_candidate, one_time_for_ephemeral, recover_one_time_private_key, GeneratedKeyPair,
    OneTimeDestination,
};
pub use hash::{hash160, keccak256, sha256d, shake256};
pub use meta::{decode_meta_address, encode_meta_address};
