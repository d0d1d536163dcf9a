//! # moc-types
//!
//! Shared types for the MOC oracle network.
//!
//! Addresses and amounts follow the EVM conventions the signed price
//! messages are built on: 20-byte addresses and 256-bit unsigned amounts.
//!
//! ## Modules
//!
//! - [`pair`]: Coin pair identifiers (32-byte zero-padded ASCII)
//! - [`math`]: Checked proportional arithmetic
//! - [`events`]: Protocol events recorded on every committed mutation

pub mod events;
pub mod math;
pub mod pair;

use serde::{Deserialize, Serialize};

pub use ethereum_types::{H160, H256, U256, U512};
pub use pair::CoinPair;

/// An account or reporting address.
pub type Address = H160;

/// A collateral, share or price amount.
pub type Amount = U256;

/// The only price message version accepted by `publishPrice`.
pub const PRICE_MESSAGE_VERSION: u64 = 3;

/// Position of the serialized execution in chain time.
///
/// Every mutating operation receives the context it executes in; nothing
/// in the core reads a clock on its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    /// Block height.
    pub number: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

impl BlockContext {
    /// Create a block context.
    pub fn new(number: u64, timestamp: u64) -> Self {
        Self { number, timestamp }
    }

    /// The context `blocks` blocks later, assuming `block_time` seconds per block.
    pub fn advance(self, blocks: u64, block_time: u64) -> Self {
        Self {
            number: self.number.saturating_add(blocks),
            timestamp: self
                .timestamp
                .saturating_add(blocks.saturating_mul(block_time)),
        }
    }
}

/// Failure category shared by every error in the workspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, rejected before any state is touched.
    InputValidation,
    /// Caller lacks the ownership, whitelist entry or governance approval.
    Authorization,
    /// The operation is valid in general but not in the current state.
    StateInvariant,
    /// A signature set does not certify the publication.
    Quorum,
}

impl ErrorKind {
    /// Stable identifier used on the RPC surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputValidation => "INPUT_VALIDATION",
            ErrorKind::Authorization => "AUTHORIZATION",
            ErrorKind::StateInvariant => "STATE_INVARIANT",
            ErrorKind::Quorum => "QUORUM",
        }
    }
}

/// Error types for shared type construction.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// Pair name is empty, not ASCII, or longer than 32 bytes.
    #[error("invalid coin pair name: {0:?}")]
    InvalidPairName(String),
}

impl TypesError {
    /// Failure category.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InputValidation
    }
}

/// Convenience result type for type construction.
pub type Result<T> = std::result::Result<T, TypesError>;
