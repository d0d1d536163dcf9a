//! Registered oracle records.

use std::collections::BTreeSet;

use moc_types::{Address, Amount, CoinPair};
use serde::{Deserialize, Serialize};

/// A registered oracle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleEntry {
    /// Account that registered the oracle and receives its rewards.
    pub owner: Address,
    /// Address the oracle signs and submits prices with.
    pub address: Address,
    /// Internet name the oracle node is reachable at.
    pub name: String,
    /// Stake backing the oracle.
    pub stake: Amount,
    /// Pairs the oracle is subscribed to.
    pub subscribed_pairs: BTreeSet<CoinPair>,
    /// Registration sequence, the tie-break among equal stakes.
    pub(crate) seq: u64,
}

impl OracleEntry {
    /// Whether the oracle is subscribed to `pair`.
    pub fn is_subscribed(&self, pair: &CoinPair) -> bool {
        self.subscribed_pairs.contains(pair)
    }

    /// Registration sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}
