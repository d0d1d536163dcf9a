//! # moc-round
//!
//! Per-pair round state machine ("CoinPairPrice").
//!
//! Each tracked pair runs consecutive rounds. A round has a fixed set of
//! selected oracles, chosen by stake from the pair's subscribers, and a
//! lock deadline before which it cannot be switched. Selected oracles
//! publish prices by collecting a majority of co-signatures from the
//! round; each accepted publication earns the proposer one point, and
//! the pair's accumulated fees are split by points when the round is
//! switched.
//!
//! ## Modules
//!
//! - [`config`]: Round parameters and their validation
//! - [`round`]: Round membership, points and read views
//! - [`quorum`]: Signature-set verification
//! - [`coin_pair_price`]: The per-pair state machine

pub mod coin_pair_price;
pub mod config;
pub mod quorum;
pub mod round;

pub use coin_pair_price::{fee_account_for, CoinPairPrice};
pub use config::RoundConfig;
pub use round::{
    OracleRoundInfo, PublishOutcome, Replacement, RewardPayout, Round, RoundInfo, RoundMember,
    SubscribeOutcome, SwitchOutcome,
};

use moc_staking::StakingError;
use moc_types::{Address, Amount, CoinPair, ErrorKind};

/// Error types for round operations.
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    /// Message version is not the supported one.
    #[error("unsupported message version {version}, only V3 is accepted")]
    UnsupportedVersion {
        /// Version in the message.
        version: u64,
    },

    /// Message is for another pair.
    #[error("coin pair mismatch: expected {expected}, got {got}")]
    PairMismatch {
        /// This instance's pair.
        expected: CoinPair,
        /// Pair in the message.
        got: CoinPair,
    },

    /// Price is zero.
    #[error("price must be positive and non-zero")]
    ZeroPrice,

    /// Caller is not the voted oracle of the message.
    #[error("sender {caller:?} does not match the voted oracle {voted:?}")]
    NotVotedOracle {
        /// Submitting address.
        caller: Address,
        /// Voted oracle in the message.
        voted: Address,
    },

    /// Message was built against another publication.
    #[error("block number does not match the last publication block: expected {expected}, got {got}")]
    StaleBlock {
        /// Current last publication block.
        expected: u64,
        /// Block in the message.
        got: u64,
    },

    /// A price was already published in this block.
    #[error("a price was already published in block {block}")]
    AlreadyPublishedInBlock {
        /// Current block.
        block: u64,
    },

    /// Submitting oracle is not selected in this round.
    #[error("voter oracle {0:?} is not part of this round")]
    VoterNotInRound(Address),

    /// Signature count does not exceed half the round.
    #[error("signature count {got} must exceed 50% of {members} round members")]
    NotEnoughSignatures {
        /// Signatures supplied.
        got: usize,
        /// Round members.
        members: usize,
    },

    /// A signature could not be recovered.
    #[error("cannot recover signature #{index}")]
    CannotRecoverSignature {
        /// Position in the signature list.
        index: usize,
    },

    /// Recovered signers are not strictly ascending.
    #[error("signatures are not unique or not ordered by address at #{index}")]
    NotUniqueOrNotOrdered {
        /// Position in the signature list.
        index: usize,
    },

    /// A recovered signer is not selected in this round.
    #[error("address of signer {signer:?} not part of this round")]
    SignerNotInRound {
        /// Recovered signer.
        signer: Address,
    },

    /// Round cannot be switched yet.
    #[error("the current round lock period is active until {lock_until}")]
    RoundLockActive {
        /// Round lock deadline.
        lock_until: u64,
    },

    /// Caller is missing from the required whitelist.
    #[error("address is not whitelisted: {0:?}")]
    NotWhitelisted(Address),

    /// Address is already on the whitelist.
    #[error("account already whitelisted: {0:?}")]
    AlreadyWhitelisted(Address),

    /// Address is the zero address.
    #[error("account must not be 0x0")]
    ZeroAddress,

    /// Too few blocks have passed for an emergency publication.
    #[error("emergency publish period didn't start: last publication at {last_publication_block}, period {period}")]
    EmergencyPeriodNotStarted {
        /// Last publication block.
        last_publication_block: u64,
        /// Required blocks without publication.
        period: u64,
    },

    /// The current price is older than the validity window.
    #[error("price expired: published at block {last_publication_block}")]
    PriceExpired {
        /// Last publication block.
        last_publication_block: u64,
    },

    /// Oracle is already subscribed to this pair.
    #[error("oracle {0:?} is already subscribed to this coin pair")]
    AlreadySubscribed(Address),

    /// Oracle is not subscribed to this pair.
    #[error("oracle {0:?} is not subscribed to this coin pair")]
    NotSubscribed(Address),

    /// Subscription list is full and the newcomer does not outstake its tail.
    #[error("not enough stake to add: {stake} does not exceed {min_stake}")]
    NotEnoughStakeToAdd {
        /// Newcomer's stake.
        stake: Amount,
        /// Lowest subscribed stake.
        min_stake: Amount,
    },

    /// Owner has no registered oracle.
    #[error("oracle not registered: {0:?}")]
    NotRegistered(Address),

    /// Invalid configuration value.
    #[error("invalid round config: {0}")]
    InvalidConfig(String),

    /// Arithmetic overflow.
    #[error("arithmetic overflow in reward calculation")]
    Overflow,

    /// Fee payout failed on the ledger.
    #[error("ledger error: {0}")]
    Ledger(#[from] StakingError),
}

impl RoundError {
    /// Failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoundError::UnsupportedVersion { .. }
            | RoundError::PairMismatch { .. }
            | RoundError::ZeroPrice
            | RoundError::ZeroAddress
            | RoundError::InvalidConfig(_)
            | RoundError::Overflow => ErrorKind::InputValidation,
            RoundError::NotVotedOracle { .. }
            | RoundError::VoterNotInRound(_)
            | RoundError::NotWhitelisted(_) => ErrorKind::Authorization,
            RoundError::NotEnoughSignatures { .. }
            | RoundError::CannotRecoverSignature { .. }
            | RoundError::NotUniqueOrNotOrdered { .. }
            | RoundError::SignerNotInRound { .. } => ErrorKind::Quorum,
            RoundError::StaleBlock { .. }
            | RoundError::AlreadyPublishedInBlock { .. }
            | RoundError::RoundLockActive { .. }
            | RoundError::AlreadyWhitelisted(_)
            | RoundError::EmergencyPeriodNotStarted { .. }
            | RoundError::PriceExpired { .. }
            | RoundError::AlreadySubscribed(_)
            | RoundError::NotSubscribed(_)
            | RoundError::NotEnoughStakeToAdd { .. }
            | RoundError::NotRegistered(_) => ErrorKind::StateInvariant,
            RoundError::Ledger(e) => e.kind(),
        }
    }
}

/// Convenience result type for round operations.
pub type Result<T> = std::result::Result<T, RoundError>;
