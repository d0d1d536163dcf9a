//! Subscription and stake-change propagation.
//!
//! The coordinator keeps a pair's subscription list and the registry's
//! per-oracle pair set in step, and pushes stake drops into the running
//! rounds of every pair.

use std::collections::BTreeMap;

use moc_registry::OracleRegistry;
use moc_round::{CoinPairPrice, Replacement, SubscribeOutcome};
use moc_types::{Address, Amount, CoinPair};
use tracing::{debug, warn};

use crate::{ManagerError, Result};

/// Round switches an oracle must sit out before it can be removed.
pub const DEFAULT_NUM_IDLE_ROUNDS: u64 = 1;

/// Round membership changes caused by a stake drop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StakeChange {
    /// Pairs the oracle was unsubscribed from, with whether it lost a seat.
    pub expelled: Vec<(CoinPair, bool)>,
    /// Pairs where the oracle's seat went to a better staked subscriber.
    pub replaced: Vec<(CoinPair, Replacement)>,
}

impl StakeChange {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.expelled.is_empty() && self.replaced.is_empty()
    }
}

/// Mediates between the registry and the pairs' round state machines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionCoordinator {
    min_subscription_stake: Amount,
    num_idle_rounds: u64,
}

impl SubscriptionCoordinator {
    /// Create a coordinator.
    pub fn new(min_subscription_stake: Amount, num_idle_rounds: u64) -> Self {
        Self {
            min_subscription_stake,
            num_idle_rounds,
        }
    }

    /// Stake required to subscribe.
    pub fn min_subscription_stake(&self) -> Amount {
        self.min_subscription_stake
    }

    /// Change the stake required to subscribe.
    pub fn set_min_subscription_stake(&mut self, amount: Amount) {
        self.min_subscription_stake = amount;
    }

    /// Idle round switches required before removal.
    pub fn num_idle_rounds(&self) -> u64 {
        self.num_idle_rounds
    }

    /// Change the idle round switches required before removal.
    pub fn set_num_idle_rounds(&mut self, rounds: u64) {
        self.num_idle_rounds = rounds;
    }

    /// Subscribe `owner` to `cpp`'s pair.
    pub fn subscribe(
        &self,
        owner: Address,
        cpp: &mut CoinPairPrice,
        registry: &mut OracleRegistry,
    ) -> Result<SubscribeOutcome> {
        let stake = registry
            .get(&owner)
            .map(|e| e.stake)
            .ok_or(moc_registry::RegistryError::NotRegistered(owner))?;
        if stake < self.min_subscription_stake {
            return Err(ManagerError::NotEnoughStake {
                stake,
                min: self.min_subscription_stake,
            });
        }

        let pair = cpp.pair();
        let outcome = cpp.subscribe(owner, registry)?;
        if let Some(evicted) = outcome.evicted {
            registry.remove_subscription(evicted, &pair)?;
        }
        registry.add_subscription(owner, pair)?;
        Ok(outcome)
    }

    /// Unsubscribe `owner` from `cpp`'s pair.
    pub fn unsubscribe(
        &self,
        owner: Address,
        cpp: &mut CoinPairPrice,
        registry: &mut OracleRegistry,
    ) -> Result<()> {
        cpp.unsubscribe(owner)?;
        registry.remove_subscription(owner, &cpp.pair())?;
        Ok(())
    }

    /// Whether `owner` has sat out enough round switches on every pair.
    pub fn can_remove_oracle(&self, owner: &Address, pairs: &BTreeMap<CoinPair, CoinPairPrice>) -> bool {
        pairs
            .values()
            .all(|cpp| cpp.is_idle(owner, self.num_idle_rounds))
    }

    /// Propagate a stake drop of `owner` from `previous` to its current
    /// registry stake.
    ///
    /// Below the minimum subscription stake the oracle is unsubscribed from
    /// every pair and loses its seats. Otherwise each seat it holds goes to
    /// the best staked waiting subscriber if that one now has more stake.
    pub fn on_stake_decreased(
        &self,
        owner: &Address,
        previous: Amount,
        registry: &mut OracleRegistry,
        pairs: &mut BTreeMap<CoinPair, CoinPairPrice>,
    ) -> Result<StakeChange> {
        let mut change = StakeChange::default();
        let stake = match registry.get(owner) {
            Some(entry) => entry.stake,
            None => return Ok(change),
        };
        if stake >= previous {
            return Ok(change);
        }

        if stake < self.min_subscription_stake {
            for (pair, cpp) in pairs.iter_mut() {
                let subscribed = cpp.is_subscribed(owner);
                let seated = cpp.expel(owner);
                if subscribed || seated {
                    registry.remove_subscription(*owner, pair)?;
                    change.expelled.push((*pair, seated));
                }
            }
            if !change.is_empty() {
                warn!(
                    ?owner,
                    %stake,
                    min = %self.min_subscription_stake,
                    pairs = change.expelled.len(),
                    "oracle dropped below minimum subscription stake"
                );
            }
            return Ok(change);
        }

        for (pair, cpp) in pairs.iter_mut() {
            if let Some(replacement) = cpp.on_stake_decreased(owner, registry) {
                change.replaced.push((*pair, replacement));
            }
        }
        debug!(?owner, %previous, %stake, replaced = change.replaced.len(), "stake decrease propagated");
        Ok(change)
    }
}

impl Default for SubscriptionCoordinator {
    fn default() -> Self {
        Self::new(Amount::zero(), DEFAULT_NUM_IDLE_ROUNDS)
    }
}
