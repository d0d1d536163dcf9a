//! # moc-crypto
//!
//! Cryptographic primitives for price publication.
//!
//! Oracles co-sign a fixed-layout price message with recoverable
//! secp256k1 ECDSA over its Ethereum signed-message hash. The round
//! manager never sees public keys, only the addresses it recovers.
//!
//! ## Modules
//!
//! - [`keccak`]: Keccak-256 and the Ethereum signed-message prefix
//! - [`secp256k1`]: Signing keys, recoverable signatures, address recovery
//! - [`message`]: The 148-byte price message

pub mod keccak;
pub mod message;
pub mod secp256k1;

pub use message::PriceMessage;
pub use secp256k1::{Signature, SigningKey};

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// `v` is not 27 or 28.
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    /// `(r, s)` is not a valid signature or no key recovers from it.
    #[error("cannot recover signature")]
    Recovery,

    /// Secret key bytes are zero or not below the curve order.
    #[error("invalid secret key")]
    InvalidSecretKey,

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience result type for cryptographic operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
