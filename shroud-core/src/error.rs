//! Error types for SHROUD.
//!
//! This module provides a comprehensive error hierarchy using `thiserror`.
//! All errors include context and are designed to be actionable.

use thiserror::Error;

/// Result type alias using `ShroudError`.
pub type Result<T> = std::result::Result<T, ShroudError>;

/// Main error type for all SHROUD operations.
#[derive(Debug, Error)]
pub enum ShroudError {
    // ═══════════════════════════════════════════════════════════════════════════
    // CRYPTOGRAPHIC ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The system entropy source failed while drawing key material.
    #[error("Entropy source unavailable: {0}")]
    InsufficientEntropy(String),

    /// A derived point collapsed to the point at infinity.
    #[error("Derived point is the point at infinity")]
    PointAtInfinity,

    /// Byte string is not a valid secp256k1 point encoding.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Byte string is not a valid non-zero scalar modulo the curve order.
    #[error("Invalid scalar: {0}")]
    InvalidScalar(String),

    /// Invalid key size or format.
    #[error("Invalid key: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    // ═══════════════════════════════════════════════════════════════════════════
    // META-ADDRESS ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Meta-address failed structural validation (prefix, base58, length,
    /// version, checksum) or carries an off-curve point.
    #[error("Invalid meta-address: {0}")]
    InvalidMetaAddress(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // KEYRING ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// No stealth key pair with the given id.
    #[error("Key pair not found: {0}")]
    KeyPairNotFound(String),

    /// Deletion refused: unspent payments are still attributed to the key pair.
    #[error("Key pair {key_pair} has {count} unspent payment(s)")]
    HasUnspentFunds { key_pair: String, count: usize },

    /// Deletion refused: the ledger view cannot be verified right now.
    #[error("Deletion blocked: {0}")]
    DeletionBlocked(String),

    /// The keystore collaborator failed.
    #[error("Keystore error: {0}")]
    KeystoreError(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // SCANNER ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The blockchain data source is unreachable or returned an error.
    #[error("Scan unavailable: {0}")]
    ScanUnavailable(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // LEDGER ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// No payment record matches the given key.
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Requested status change violates the outgoing payment state machine.
    /// Surfaced instead of panicking; hitting this is a caller bug.
    #[error("Invalid status transition: {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // VALIDATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Payment amount must be strictly positive.
    #[error("Invalid payment amount: {0}")]
    InvalidAmount(u128),

    /// Input validation failed.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid hex encoding.
    #[error("Invalid hex encoding: {0}")]
    HexError(#[from] hex::FromHexError),

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Internal invariant violation (should never happen).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ShroudError {
    /// Returns true if this error is recoverable (can retry).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ShroudError::ScanUnavailable(_) | ShroudError::InsufficientEntropy(_)
        )
    }

    /// Returns true if this is a cryptographic error.
    pub fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            ShroudError::InsufficientEntropy(_)
                | ShroudError::PointAtInfinity
                | ShroudError::InvalidPublicKey(_)
                | ShroudError::InvalidScalar(_)
                | ShroudError::InvalidKeySize { .. }
        )
    }

    /// Returns true if this is a validation error.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            ShroudError::ValidationError(_)
                | ShroudError::InvalidMetaAddress(_)
                | ShroudError::InvalidAmount(_)
                | ShroudError::ConfigError(_)
        )
    }
}
