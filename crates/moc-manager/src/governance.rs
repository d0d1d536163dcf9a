//! Governance-gated protocol changes.
//!
//! A [`ProtocolChange`] is a command object naming one parameter change.
//! The network applies it only after its [`ChangeAuthorizer`] accepts the
//! caller for that change. Nothing in the core issues changes on its own.

use moc_round::RoundConfig;
use moc_types::{Address, Amount, CoinPair};
use serde::{Deserialize, Serialize};

/// A privileged parameter change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ProtocolChange {
    /// Start tracking a pair.
    RegisterPair { pair: CoinPair, config: RoundConfig },
    SetMinOraclesPerRound { pair: CoinPair, value: usize },
    SetMaxOraclesPerRound { pair: CoinPair, value: usize },
    SetMaxSubscribedOracles { pair: CoinPair, value: usize },
    SetRoundLockPeriod { pair: CoinPair, secs: u64 },
    SetValidPricePeriod { pair: CoinPair, blocks: u64 },
    SetEmergencyPublishingPeriod { pair: CoinPair, blocks: u64 },
    AddToReadWhitelist { pair: CoinPair, account: Address },
    RemoveFromReadWhitelist { pair: CoinPair, account: Address },
    AddToEmergencyWhitelist { pair: CoinPair, account: Address },
    RemoveFromEmergencyWhitelist { pair: CoinPair, account: Address },
    /// Minimum stake needed to subscribe. Existing subscriptions are kept.
    SetMinSubscriptionStake { amount: Amount },
    /// Idle round switches required before an oracle may be removed.
    SetNumIdleRounds { rounds: u64 },
    SetVestingPeriod { blocks: u64 },
    SetWithdrawLockTime { secs: u64 },
    AddToStakingWhitelist { account: Address },
    RemoveFromStakingWhitelist { account: Address },
    AddLocker { account: Address },
    RemoveLocker { account: Address },
}

impl ProtocolChange {
    /// Change name, as recorded in events.
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolChange::RegisterPair { .. } => "register_pair",
            ProtocolChange::SetMinOraclesPerRound { .. } => "set_min_oracles_per_round",
            ProtocolChange::SetMaxOraclesPerRound { .. } => "set_max_oracles_per_round",
            ProtocolChange::SetMaxSubscribedOracles { .. } => "set_max_subscribed_oracles",
            ProtocolChange::SetRoundLockPeriod { .. } => "set_round_lock_period",
            ProtocolChange::SetValidPricePeriod { .. } => "set_valid_price_period",
            ProtocolChange::SetEmergencyPublishingPeriod { .. } => {
                "set_emergency_publishing_period"
            }
            ProtocolChange::AddToReadWhitelist { .. } => "add_to_read_whitelist",
            ProtocolChange::RemoveFromReadWhitelist { .. } => "remove_from_read_whitelist",
            ProtocolChange::AddToEmergencyWhitelist { .. } => "add_to_emergency_whitelist",
            ProtocolChange::RemoveFromEmergencyWhitelist { .. } => {
                "remove_from_emergency_whitelist"
            }
            ProtocolChange::SetMinSubscriptionStake { .. } => "set_min_subscription_stake",
            ProtocolChange::SetNumIdleRounds { .. } => "set_num_idle_rounds",
            ProtocolChange::SetVestingPeriod { .. } => "set_vesting_period",
            ProtocolChange::SetWithdrawLockTime { .. } => "set_withdraw_lock_time",
            ProtocolChange::AddToStakingWhitelist { .. } => "add_to_staking_whitelist",
            ProtocolChange::RemoveFromStakingWhitelist { .. } => "remove_from_staking_whitelist",
            ProtocolChange::AddLocker { .. } => "add_locker",
            ProtocolChange::RemoveLocker { .. } => "remove_locker",
        }
    }

    /// Pair the change applies to, if any.
    pub fn pair(&self) -> Option<CoinPair> {
        match self {
            ProtocolChange::RegisterPair { pair, .. }
            | ProtocolChange::SetMinOraclesPerRound { pair, .. }
            | ProtocolChange::SetMaxOraclesPerRound { pair, .. }
            | ProtocolChange::SetMaxSubscribedOracles { pair, .. }
            | ProtocolChange::SetRoundLockPeriod { pair, .. }
            | ProtocolChange::SetValidPricePeriod { pair, .. }
            | ProtocolChange::SetEmergencyPublishingPeriod { pair, .. }
            | ProtocolChange::AddToReadWhitelist { pair, .. }
            | ProtocolChange::RemoveFromReadWhitelist { pair, .. }
            | ProtocolChange::AddToEmergencyWhitelist { pair, .. }
            | ProtocolChange::RemoveFromEmergencyWhitelist { pair, .. } => Some(*pair),
            _ => None,
        }
    }
}

/// Capability check run before a change is applied.
pub trait ChangeAuthorizer: Send {
    /// Whether `caller` may apply `change`.
    fn authorize(&self, caller: &Address, change: &ProtocolChange) -> bool;
}

/// Authorizer that accepts every change from a single owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Governor {
    owner: Address,
}

impl Governor {
    /// Create a governor owned by `owner`.
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    /// The governor's owner.
    pub fn owner(&self) -> Address {
        self.owner
    }
}

impl ChangeAuthorizer for Governor {
    fn authorize(&self, caller: &Address, _change: &ProtocolChange) -> bool {
        !self.owner.is_zero() && *caller == self.owner
    }
}
