//! Protocol events.
//!
//! Every committed mutation records one or more events, in the order
//! the state changes were applied. A rejected call records nothing.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, CoinPair};

/// A protocol event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// An oracle joined the registry.
    OracleRegistered {
        owner: Address,
        address: Address,
        name: String,
    },
    /// An oracle left the registry.
    OracleRemoved { owner: Address, address: Address },
    /// An oracle changed its internet name.
    OracleNameChanged { owner: Address, name: String },
    /// An oracle subscribed to a pair.
    OracleSubscribed { owner: Address, pair: CoinPair },
    /// An oracle left a pair's subscription list, voluntarily or not.
    OracleUnsubscribed { owner: Address, pair: CoinPair },
    /// An oracle joined the running round of a pair.
    OracleJoinedRound {
        owner: Address,
        pair: CoinPair,
        round: u64,
    },
    /// An oracle was removed from the running round, forfeiting its points.
    OracleLeftRound {
        owner: Address,
        pair: CoinPair,
        round: u64,
    },
    /// Collateral entered the staking pool.
    StakeDeposited {
        owner: Address,
        subaccount: Address,
        amount: Amount,
        shares: Amount,
    },
    /// Collateral left the staking pool towards the delay vault.
    StakeWithdrawn {
        owner: Address,
        subaccount: Address,
        amount: Amount,
        shares: Amount,
        delay_id: Option<u64>,
    },
    /// A new vesting schedule started.
    PayEarnings {
        earnings: Amount,
        start: u64,
        end: u64,
    },
    /// Stake was locked until a timestamp.
    StakeLocked {
        owner: Address,
        amount: Amount,
        until: u64,
    },
    /// Funds released by the delay vault.
    DelayedPaymentReleased {
        id: u64,
        beneficiary: Address,
        amount: Amount,
    },
    /// A quorum-certified price was accepted.
    PricePublished {
        pair: CoinPair,
        sender: Address,
        voted_oracle: Address,
        price: Amount,
        block: u64,
    },
    /// An emergency price was accepted.
    EmergencyPricePublished {
        pair: CoinPair,
        sender: Address,
        price: Amount,
        block: u64,
    },
    /// A round reward was paid to an oracle owner.
    OracleRewardTransfer {
        pair: CoinPair,
        round: u64,
        owner: Address,
        address: Address,
        amount: Amount,
    },
    /// A pair entered a new round.
    NewRound {
        pair: CoinPair,
        caller: Address,
        number: u64,
        lock_until: u64,
        selected: Vec<Address>,
    },
    /// A governance change was applied.
    ProtocolChangeExecuted { caller: Address, change: String },
}

impl Event {
    /// Event type name.
    pub fn name(&self) -> &'static str {
        match self {
            Event::OracleRegistered { .. } => "OracleRegistered",
            Event::OracleRemoved { .. } => "OracleRemoved",
            Event::OracleNameChanged { .. } => "OracleNameChanged",
            Event::OracleSubscribed { .. } => "OracleSubscribed",
            Event::OracleUnsubscribed { .. } => "OracleUnsubscribed",
            Event::OracleJoinedRound { .. } => "OracleJoinedRound",
            Event::OracleLeftRound { .. } => "OracleLeftRound",
            Event::StakeDeposited { .. } => "StakeDeposited",
            Event::StakeWithdrawn { .. } => "StakeWithdrawn",
            Event::PayEarnings { .. } => "PayEarnings",
            Event::StakeLocked { .. } => "StakeLocked",
            Event::DelayedPaymentReleased { .. } => "DelayedPaymentReleased",
            Event::PricePublished { .. } => "PricePublished",
            Event::EmergencyPricePublished { .. } => "EmergencyPricePublished",
            Event::OracleRewardTransfer { .. } => "OracleRewardTransfer",
            Event::NewRound { .. } => "NewRound",
            Event::ProtocolChangeExecuted { .. } => "ProtocolChangeExecuted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagged_json() {
        let event = Event::PayEarnings {
            earnings: Amount::from(5),
            start: 10,
            end: 20,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "PayEarnings");
        assert_eq!(json["start"], 10);
        assert_eq!(event.name(), "PayEarnings");
    }
}
