//! The stake-ordered oracle registry.
//!
//! `order` maps `(Reverse(stake), seq)` to the owner, so in-order
//! iteration yields oracles from highest to lowest stake, with earlier
//! registrations first among equal stakes. An entry's `seq` never changes,
//! so a stake update is a remove and re-insert of a single index key.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use moc_types::{Address, Amount, CoinPair};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entry::OracleEntry;
use crate::{RegistryError, Result};

type OrderKey = (Reverse<Amount>, u64);

/// Claimed predecessor of a position in the order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "owner", rename_all = "snake_case")]
pub enum PrevHint {
    /// The position is the head of the order.
    Head,
    /// The position directly follows this owner's oracle.
    After(Address),
}

/// A signed stake change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeDelta {
    /// Add to the stake.
    Increase(Amount),
    /// Subtract from the stake.
    Decrease(Amount),
}

/// All registered oracles, ordered by stake.
#[derive(Debug, Default)]
pub struct OracleRegistry {
    entries: HashMap<Address, OracleEntry>,
    by_address: HashMap<Address, Address>,
    order: BTreeMap<OrderKey, Address>,
    next_seq: u64,
}

impl OracleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered oracles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no oracle is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register an oracle.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ZeroAddress`] if `owner` or `address` is zero
    /// - [`RegistryError::OwnerAlreadyRegistered`] / [`RegistryError::AddressAlreadyRegistered`]
    /// - [`RegistryError::InvalidHint`] if `hint` is given and is not the predecessor
    pub fn register(
        &mut self,
        owner: Address,
        address: Address,
        name: impl Into<String>,
        stake: Amount,
        hint: Option<PrevHint>,
    ) -> Result<&OracleEntry> {
        if owner.is_zero() {
            return Err(RegistryError::ZeroAddress { field: "owner" });
        }
        if address.is_zero() {
            return Err(RegistryError::ZeroAddress { field: "oracle" });
        }
        if self.entries.contains_key(&owner) {
            return Err(RegistryError::OwnerAlreadyRegistered(owner));
        }
        if self.by_address.contains_key(&address) {
            return Err(RegistryError::AddressAlreadyRegistered(address));
        }

        let key = (Reverse(stake), self.next_seq);
        if let Some(hint) = hint {
            let expected = self.predecessor(&key, None);
            self.check_hint(expected, &hint)
                .map_err(|e| RegistryError::InvalidHint(Box::new(e)))?;
        }

        let entry = OracleEntry {
            owner,
            address,
            name: name.into(),
            stake,
            subscribed_pairs: Default::default(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.order.insert(key, owner);
        self.by_address.insert(address, owner);
        info!(?owner, ?address, %stake, "oracle registered");
        Ok(self.entries.entry(owner).or_insert(entry))
    }

    /// Apply a stake delta and reposition the oracle. Returns the new stake.
    pub fn adjust_stake(
        &mut self,
        owner: Address,
        delta: StakeDelta,
        hint: Option<PrevHint>,
    ) -> Result<Amount> {
        let current = self.entry(&owner)?.stake;
        let stake = match delta {
            StakeDelta::Increase(amount) => current
                .checked_add(amount)
                .ok_or(RegistryError::Overflow)?,
            StakeDelta::Decrease(amount) => {
                current
                    .checked_sub(amount)
                    .ok_or(RegistryError::StakeUnderflow {
                        stake: current,
                        decrease: amount,
                    })?
            }
        };
        self.set_stake(owner, stake, hint)?;
        Ok(stake)
    }

    /// Set the oracle's stake and reposition it. Returns the previous stake.
    pub fn set_stake(
        &mut self,
        owner: Address,
        stake: Amount,
        hint: Option<PrevHint>,
    ) -> Result<Amount> {
        let entry = self.entry(&owner)?;
        let old_key = (Reverse(entry.stake), entry.seq);
        let new_key = (Reverse(stake), entry.seq);
        if let Some(hint) = hint {
            let expected = self.predecessor(&new_key, Some(&old_key));
            self.check_hint(expected, &hint)
                .map_err(|e| RegistryError::InvalidHint(Box::new(e)))?;
        }

        let previous = entry.stake;
        if old_key != new_key {
            self.order.remove(&old_key);
            self.order.insert(new_key, owner);
        }
        if let Some(entry) = self.entries.get_mut(&owner) {
            entry.stake = stake;
        }
        debug!(?owner, %previous, %stake, "oracle stake updated");
        Ok(previous)
    }

    /// Remove an oracle. Whether it may leave is decided by the caller,
    /// which knows the rounds it takes part in.
    pub fn remove(&mut self, owner: Address) -> Result<OracleEntry> {
        let entry = self
            .entries
            .remove(&owner)
            .ok_or(RegistryError::NotRegistered(owner))?;
        self.order.remove(&(Reverse(entry.stake), entry.seq));
        self.by_address.remove(&entry.address);
        info!(?owner, address = ?entry.address, "oracle removed");
        Ok(entry)
    }

    /// Change an oracle's internet name.
    pub fn set_name(&mut self, owner: Address, name: impl Into<String>) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&owner)
            .ok_or(RegistryError::NotRegistered(owner))?;
        entry.name = name.into();
        Ok(())
    }

    /// Record a subscription. Returns `false` if it already existed.
    pub fn add_subscription(&mut self, owner: Address, pair: CoinPair) -> Result<bool> {
        let entry = self
            .entries
            .get_mut(&owner)
            .ok_or(RegistryError::NotRegistered(owner))?;
        Ok(entry.subscribed_pairs.insert(pair))
    }

    /// Drop a subscription. Returns `false` if there was none.
    pub fn remove_subscription(&mut self, owner: Address, pair: &CoinPair) -> Result<bool> {
        let entry = self
            .entries
            .get_mut(&owner)
            .ok_or(RegistryError::NotRegistered(owner))?;
        Ok(entry.subscribed_pairs.remove(pair))
    }

    /// Look up an oracle by owner.
    pub fn get(&self, owner: &Address) -> Option<&OracleEntry> {
        self.entries.get(owner)
    }

    /// Look up an oracle by reporting address.
    pub fn get_by_address(&self, address: &Address) -> Option<&OracleEntry> {
        self.by_address
            .get(address)
            .and_then(|owner| self.entries.get(owner))
    }

    /// Owner of the oracle reporting from `address`.
    pub fn owner_of(&self, address: &Address) -> Option<Address> {
        self.by_address.get(address).copied()
    }

    /// Whether `owner` has a registered oracle.
    pub fn is_registered(&self, owner: &Address) -> bool {
        self.entries.contains_key(owner)
    }

    /// Highest-staked oracle.
    pub fn head(&self) -> Option<&OracleEntry> {
        self.order
            .values()
            .next()
            .and_then(|owner| self.entries.get(owner))
    }

    /// Oracle ordered directly after `owner`.
    pub fn next(&self, owner: &Address) -> Option<&OracleEntry> {
        let entry = self.entries.get(owner)?;
        let key = (Reverse(entry.stake), entry.seq);
        self.order
            .range((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .and_then(|(_, owner)| self.entries.get(owner))
    }

    /// All oracles from highest to lowest stake.
    pub fn iter(&self) -> impl Iterator<Item = &OracleEntry> + '_ {
        self.order.values().filter_map(|owner| self.entries.get(owner))
    }

    /// Predecessor a newly registered oracle with `stake` would get.
    ///
    /// With a hint, the hint is checked instead of just answered.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidPrevEntry`] if the hinted owner is not registered
    /// - [`RegistryError::WrongPrevEntry`] if the hint is not the predecessor
    pub fn query_prev_by_stake(
        &self,
        stake: Amount,
        hint: Option<PrevHint>,
    ) -> Result<Option<Address>> {
        let expected = self.predecessor(&(Reverse(stake), self.next_seq), None);
        if let Some(hint) = hint {
            self.check_hint(expected, &hint)?;
        }
        Ok(expected)
    }

    /// Current predecessor of `owner`'s oracle, optionally checking a hint.
    pub fn query_prev(&self, owner: &Address, hint: Option<PrevHint>) -> Result<Option<Address>> {
        let entry = self.entry(owner)?;
        let key = (Reverse(entry.stake), entry.seq);
        let expected = self.predecessor(&key, Some(&key));
        if let Some(hint) = hint {
            self.check_hint(expected, &hint)?;
        }
        Ok(expected)
    }

    fn entry(&self, owner: &Address) -> Result<&OracleEntry> {
        self.entries
            .get(owner)
            .ok_or(RegistryError::NotRegistered(*owner))
    }

    fn predecessor(&self, key: &OrderKey, exclude: Option<&OrderKey>) -> Option<Address> {
        self.order
            .range(..*key)
            .rev()
            .find(|(k, _)| Some(*k) != exclude)
            .map(|(_, owner)| *owner)
    }

    fn check_hint(&self, expected: Option<Address>, hint: &PrevHint) -> Result<()> {
        let got = match hint {
            PrevHint::Head => None,
            PrevHint::After(owner) => {
                if !self.entries.contains_key(owner) {
                    return Err(RegistryError::InvalidPrevEntry(*owner));
                }
                Some(*owner)
            }
        };
        if got != expected {
            return Err(RegistryError::WrongPrevEntry { expected, got });
        }
        Ok(())
    }
}
