//! # moc-manager
//!
//! Ties the registry, the staking pool and every pair's round state
//! machine together behind one serialized entry point.
//!
//! Stake changes flow from staking into the registry order and from
//! there into round membership; subscriptions are mirrored in both the
//! pair and the registry entry. Privileged parameter changes go through
//! a [`governance::ChangeAuthorizer`].
//!
//! ## Modules
//!
//! - [`governance`]: Protocol change commands and their authorization
//! - [`coordinator`]: Subscription and stake-change propagation
//! - [`network`]: The `OracleNetwork` facade

pub mod coordinator;
pub mod governance;
pub mod network;

pub use coordinator::{StakeChange, SubscriptionCoordinator, DEFAULT_NUM_IDLE_ROUNDS};
pub use governance::{ChangeAuthorizer, Governor, ProtocolChange};
pub use network::{NetworkConfig, OracleNetwork};

use moc_registry::RegistryError;
use moc_round::RoundError;
use moc_staking::StakingError;
use moc_types::{Address, Amount, CoinPair, ErrorKind};

/// Error types for network operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// Registry rejected the operation.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Staking rejected the operation.
    #[error(transparent)]
    Staking(#[from] StakingError),

    /// A pair's round state machine rejected the operation.
    #[error(transparent)]
    Round(#[from] RoundError),

    /// Pair is not tracked.
    #[error("unknown coin pair {0}")]
    UnknownPair(CoinPair),

    /// Pair is already tracked.
    #[error("coin pair {0} already registered")]
    PairAlreadyRegistered(CoinPair),

    /// Oracle still holds a seat or has not sat out enough rounds.
    #[error("oracle {owner:?} is not ready to be removed")]
    NotReadyToRemove {
        /// Oracle owner.
        owner: Address,
    },

    /// Stake is below the minimum subscription stake.
    #[error("not enough stake to subscribe: {stake} < {min}")]
    NotEnoughStake {
        /// Oracle stake.
        stake: Amount,
        /// Minimum subscription stake.
        min: Amount,
    },

    /// Caller may not apply protocol changes.
    #[error("caller {0:?} is not an authorized changer")]
    NotAuthorizedChanger(Address),

    /// Invalid network configuration.
    #[error("invalid network config: {0}")]
    InvalidConfig(String),
}

impl ManagerError {
    /// Failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::Registry(e) => e.kind(),
            ManagerError::Staking(e) => e.kind(),
            ManagerError::Round(e) => e.kind(),
            ManagerError::UnknownPair(_) | ManagerError::InvalidConfig(_) => {
                ErrorKind::InputValidation
            }
            ManagerError::NotAuthorizedChanger(_) => ErrorKind::Authorization,
            ManagerError::PairAlreadyRegistered(_)
            | ManagerError::NotReadyToRemove { .. }
            | ManagerError::NotEnoughStake { .. } => ErrorKind::StateInvariant,
        }
    }
}

/// Convenience result type for network operations.
pub type Result<T> = std::result::Result<T, ManagerError>;
