//! # moc-staking
//!
//! Share-based collateral staking.
//!
//! Deposits mint internal shares at the current exchange rate, rewards
//! vest linearly into the pool, and withdrawals burn shares and hand the
//! released collateral to a delay vault instead of paying out directly.
//!
//! ## Modules
//!
//! - [`ledger`]: Collateral token ledger interface and an in-memory ledger
//! - [`delay`]: Delayed-withdrawal vault interface and the delay machine
//! - [`pool`]: Share accounting and linear vesting
//! - [`staking`]: Staking facade: subaccounts, whitelists, stake locks

pub mod delay;
pub mod ledger;
pub mod pool;
pub mod staking;

pub use delay::{DelayMachine, DelayVault, DelayedPayment};
pub use ledger::{CollateralLedger, InMemoryLedger};
pub use pool::{SharePool, StakeAccount, VestingSchedule};
pub use staking::{DepositReceipt, StakeLock, Staking, StakingConfig, WithdrawReceipt};

use moc_types::{Address, Amount, ErrorKind};

/// Error types for staking operations.
#[derive(Debug, thiserror::Error)]
pub enum StakingError {
    /// Amount is zero.
    #[error("amount is zero")]
    ZeroAmount,

    /// Address is the zero address.
    #[error("account must not be 0x0")]
    ZeroAddress,

    /// Ledger balance too low for a transfer.
    #[error("insufficient balance for {account:?}: need {needed}, have {available}")]
    InsufficientBalance {
        /// Account being debited.
        account: Address,
        /// Amount requested.
        needed: Amount,
        /// Amount held.
        available: Amount,
    },

    /// Ledger allowance too low for a delegated transfer.
    #[error("insufficient allowance: need {needed}, have {available}")]
    InsufficientAllowance {
        /// Amount requested.
        needed: Amount,
        /// Amount approved.
        available: Amount,
    },

    /// Share burn exceeds the holder's shares.
    #[error("insufficient shares: need {needed}, have {available}")]
    InsufficientShares {
        /// Shares requested.
        needed: Amount,
        /// Shares held.
        available: Amount,
    },

    /// The previous vesting schedule is still running, or there are no shares.
    #[error("not ready to distribute")]
    NotReadyToDistribute,

    /// Caller is not whitelisted for the operation.
    #[error("address is not whitelisted: {0:?}")]
    NotWhitelisted(Address),

    /// Address is already whitelisted.
    #[error("account already whitelisted: {0:?}")]
    AlreadyWhitelisted(Address),

    /// Withdrawal would dip into locked stake.
    #[error("stake not available for withdrawal: {locked} locked until {until}")]
    StakeLocked {
        /// Locked amount.
        locked: Amount,
        /// Lock expiry timestamp.
        until: u64,
    },

    /// Delayed payment id unknown, or caller is not allowed to touch it.
    #[error("invalid delayed payment id {0}")]
    InvalidId(u64),

    /// Delayed payment is still locked.
    #[error("delayed payment not expired: unlocks at {unlock_time}")]
    NotExpired {
        /// Unlock timestamp.
        unlock_time: u64,
    },

    /// Invalid configuration value.
    #[error("invalid staking config: {0}")]
    InvalidConfig(String),

    /// Arithmetic overflow.
    #[error("arithmetic overflow in staking calculation")]
    Overflow,
}

impl StakingError {
    /// Failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StakingError::ZeroAmount
            | StakingError::ZeroAddress
            | StakingError::InvalidConfig(_)
            | StakingError::Overflow => ErrorKind::InputValidation,
            StakingError::NotWhitelisted(_) | StakingError::InvalidId(_) => {
                ErrorKind::Authorization
            }
            StakingError::InsufficientBalance { .. }
            | StakingError::InsufficientAllowance { .. }
            | StakingError::InsufficientShares { .. }
            | StakingError::NotReadyToDistribute
            | StakingError::AlreadyWhitelisted(_)
            | StakingError::StakeLocked { .. }
            | StakingError::NotExpired { .. } => ErrorKind::StateInvariant,
        }
    }
}

/// Convenience result type for staking operations.
pub type Result<T> = std::result::Result<T, StakingError>;
