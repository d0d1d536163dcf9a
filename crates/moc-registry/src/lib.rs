//! # moc-registry
//!
//! Stake-ordered oracle registry.
//!
//! Oracles are kept in a single total order, highest stake first, ties
//! broken by registration order. The order is an ordered index keyed by
//! `(stake desc, registration sequence)`, so every insert, move and
//! removal is `O(log n)` and the order can never be observed half-updated.
//! Callers may still pass a predecessor hint; a hint is validated against
//! the index and rejected if wrong, never trusted.
//!
//! ## Modules
//!
//! - [`entry`]: Registered oracle records
//! - [`registry`]: The ordered registry and its hint checks

pub mod entry;
pub mod registry;

pub use entry::OracleEntry;
pub use registry::{OracleRegistry, PrevHint, StakeDelta};

use moc_types::{Address, Amount, ErrorKind};

/// Error types for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Owner or reporting address is the zero address.
    #[error("{field} address cannot be 0x0")]
    ZeroAddress {
        /// Which address was zero.
        field: &'static str,
    },

    /// Owner already has a registered oracle.
    #[error("owner {0:?} already registered")]
    OwnerAlreadyRegistered(Address),

    /// Reporting address is already used by another oracle.
    #[error("oracle {0:?} already registered")]
    AddressAlreadyRegistered(Address),

    /// No oracle is registered for the owner or address.
    #[error("oracle not registered: {0:?}")]
    NotRegistered(Address),

    /// A positional hint passed to a mutation did not match the order.
    #[error("invalid position hint: {0}")]
    InvalidHint(Box<RegistryError>),

    /// The hinted predecessor is not a registered oracle.
    #[error("invalid prev entry {0:?}")]
    InvalidPrevEntry(Address),

    /// The hinted predecessor does not bound the target position.
    #[error("wrong prev entry: expected {expected:?}, got {got:?}")]
    WrongPrevEntry {
        /// The actual predecessor (`None` for the head).
        expected: Option<Address>,
        /// The hinted predecessor.
        got: Option<Address>,
    },

    /// A stake decrease exceeds the current stake.
    #[error("stake underflow: stake {stake}, decrease {decrease}")]
    StakeUnderflow {
        /// Current stake.
        stake: Amount,
        /// Requested decrease.
        decrease: Amount,
    },

    /// Arithmetic overflow.
    #[error("arithmetic overflow in stake update")]
    Overflow,
}

impl RegistryError {
    /// Failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::ZeroAddress { .. }
            | RegistryError::StakeUnderflow { .. }
            | RegistryError::Overflow => ErrorKind::InputValidation,
            RegistryError::OwnerAlreadyRegistered(_)
            | RegistryError::AddressAlreadyRegistered(_)
            | RegistryError::NotRegistered(_)
            | RegistryError::InvalidHint(_)
            | RegistryError::InvalidPrevEntry(_)
            | RegistryError::WrongPrevEntry { .. } => ErrorKind::StateInvariant,
        }
    }
}

/// Convenience result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
