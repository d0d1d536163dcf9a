//! Round membership and points.
//!
//! Membership has two views: the committed member list, used for quorum
//! checks, and a per-member `excluded` flag set when a member
//! unsubscribes. Excluded members keep publishing and keep their points
//! until the round is switched.

use moc_types::{Address, Amount};
use serde::{Deserialize, Serialize};

/// A selected oracle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundMember {
    /// Oracle owner, paid the round reward.
    pub owner: Address,
    /// Reporting address, checked against signatures.
    pub address: Address,
    /// Accepted publications proposed this round.
    pub points: u64,
    /// Unsubscribed during the round; not re-selected at the next switch.
    pub excluded: bool,
}

/// The running round of a pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Round number, starting at 1.
    pub number: u64,
    /// Timestamp after which the round may be switched.
    pub lock_until: u64,
    /// Selected oracles, highest stake first at selection time.
    pub members: Vec<RoundMember>,
    /// Fewer members than the configured minimum were available.
    pub below_minimum: bool,
}

impl Round {
    /// The round a pair starts in: empty and immediately switchable.
    pub fn initial() -> Self {
        Self {
            number: 1,
            lock_until: 0,
            members: Vec::new(),
            below_minimum: false,
        }
    }

    /// Member reporting from `address`.
    pub fn member_by_address(&self, address: &Address) -> Option<&RoundMember> {
        self.members.iter().find(|m| m.address == *address)
    }

    /// Member owned by `owner`.
    pub fn member_by_owner(&self, owner: &Address) -> Option<&RoundMember> {
        self.members.iter().find(|m| m.owner == *owner)
    }

    /// Whether `owner`'s oracle is a member.
    pub fn contains_owner(&self, owner: &Address) -> bool {
        self.member_by_owner(owner).is_some()
    }

    /// Sum of all members' points.
    pub fn total_points(&self) -> u64 {
        self.members.iter().map(|m| m.points).sum()
    }

    pub(crate) fn member_mut(&mut self, owner: &Address) -> Option<&mut RoundMember> {
        self.members.iter_mut().find(|m| m.owner == *owner)
    }

    pub(crate) fn remove_owner(&mut self, owner: &Address) -> Option<RoundMember> {
        let idx = self.members.iter().position(|m| m.owner == *owner)?;
        Some(self.members.remove(idx))
    }

    pub(crate) fn set_excluded(&mut self, owner: &Address, excluded: bool) {
        if let Some(member) = self.member_mut(owner) {
            member.excluded = excluded;
        }
    }
}

/// Round summary for readers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInfo {
    /// Round number.
    pub number: u64,
    /// Lock deadline timestamp.
    pub lock_until: u64,
    /// Reporting addresses of selected oracles.
    pub selected: Vec<Address>,
    /// Total points accrued so far.
    pub total_points: u64,
    /// Fewer members than the configured minimum.
    pub below_minimum: bool,
}

/// Per-oracle round state for readers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRoundInfo {
    /// Points this round.
    pub points: u64,
    /// Whether the oracle is a member of the running round.
    pub selected: bool,
    /// Whether the member is flagged for exclusion at the next switch.
    pub excluded: bool,
}

/// Result of a subscription.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeOutcome {
    /// Owner dropped from a full subscription list to make room.
    pub evicted: Option<Address>,
    /// Whether the subscriber joined the running round immediately.
    pub joined_round: bool,
}

/// A mid-round member swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    /// Owner removed from the round, points forfeited.
    pub removed: Address,
    /// Owner that took the seat.
    pub added: Address,
}

/// Result of an accepted publication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    /// Owner of the voted oracle.
    pub owner: Address,
    /// Its points after the publication.
    pub points: u64,
    /// Signers recovered, ascending.
    pub signers: Vec<Address>,
}

/// A reward paid at a round switch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPayout {
    /// Paid owner.
    pub owner: Address,
    /// Reporting address of the paid oracle.
    pub address: Address,
    /// Points the reward was weighted by.
    pub points: u64,
    /// Amount transferred.
    pub amount: Amount,
}

/// Result of a round switch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchOutcome {
    /// The round that ended.
    pub previous_round: u64,
    /// The round that started.
    pub round: u64,
    /// Its lock deadline.
    pub lock_until: u64,
    /// Its members, as `(owner, address)`, highest stake first.
    pub selected: Vec<(Address, Address)>,
    /// Rewards paid for the previous round.
    pub payouts: Vec<RewardPayout>,
    /// Total paid.
    pub distributed: Amount,
    /// Fewer members than the configured minimum.
    pub below_minimum: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(n: u64, points: u64) -> RoundMember {
        RoundMember {
            owner: Address::from_low_u64_be(n),
            address: Address::from_low_u64_be(100 + n),
            points,
            excluded: false,
        }
    }

    #[test]
    fn test_lookup_and_points() {
        let mut round = Round::initial();
        round.members = vec![member(1, 2), member(2, 3)];
        assert_eq!(round.total_points(), 5);
        assert!(round.contains_owner(&Address::from_low_u64_be(2)));
        assert_eq!(
            round
                .member_by_address(&Address::from_low_u64_be(101))
                .map(|m| m.points),
            Some(2)
        );

        round.set_excluded(&Address::from_low_u64_be(1), true);
        assert!(round.members[0].excluded);

        let removed = round.remove_owner(&Address::from_low_u64_be(1));
        assert_eq!(removed.map(|m| m.points), Some(2));
        assert_eq!(round.total_points(), 3);
    }
}
