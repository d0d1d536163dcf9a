//! The per-pair round state machine.
//!
//! `CoinPairPrice` owns a pair's subscription list, its running round and
//! its price. It reads stakes from the registry and pays rewards from
//! the pair's fee account on the collateral ledger; it never mutates
//! either collaborator's ordering or balances directly otherwise.

use std::collections::{BTreeSet, HashMap};

use moc_crypto::keccak::keccak256;
use moc_crypto::{PriceMessage, Signature};
use moc_registry::OracleRegistry;
use moc_staking::CollateralLedger;
use moc_types::math::mul_div;
use moc_types::{Address, Amount, BlockContext, CoinPair, PRICE_MESSAGE_VERSION};
use tracing::{debug, error, info, warn};

use crate::config::RoundConfig;
use crate::quorum::verify_signatures;
use crate::round::{
    OracleRoundInfo, PublishOutcome, Replacement, RewardPayout, Round, RoundInfo, RoundMember,
    SubscribeOutcome, SwitchOutcome,
};
use crate::{Result, RoundError};

/// Ledger account holding the reward fees of `pair`.
pub fn fee_account_for(pair: &CoinPair) -> Address {
    let mut seed = Vec::with_capacity(40);
    seed.extend_from_slice(b"moc.fees");
    seed.extend_from_slice(pair.as_bytes());
    Address::from_slice(&keccak256(&seed).as_bytes()[12..])
}

/// Round state machine and price of one pair.
#[derive(Debug)]
pub struct CoinPairPrice {
    pair: CoinPair,
    config: RoundConfig,
    round: Round,
    subscribed: BTreeSet<Address>,
    last_selected: HashMap<Address, u64>,
    current_price: Amount,
    last_publication_block: u64,
    publication_timestamp: u64,
    fee_account: Address,
    read_whitelist: BTreeSet<Address>,
    emergency_whitelist: BTreeSet<Address>,
}

impl CoinPairPrice {
    /// Start tracking `pair` at `ctx`, with the bootstrap price published.
    pub fn new(pair: CoinPair, config: RoundConfig, ctx: BlockContext) -> Result<Self> {
        config.validate()?;
        let read_whitelist = config.read_whitelist.iter().copied().collect();
        let emergency_whitelist = config.emergency_whitelist.iter().copied().collect();
        info!(%pair, bootstrap_price = %config.bootstrap_price, "coin pair created");
        Ok(Self {
            pair,
            current_price: config.bootstrap_price,
            config,
            round: Round::initial(),
            subscribed: BTreeSet::new(),
            last_selected: HashMap::new(),
            last_publication_block: ctx.number,
            publication_timestamp: ctx.timestamp,
            fee_account: fee_account_for(&pair),
            read_whitelist,
            emergency_whitelist,
        })
    }

    /// The tracked pair.
    pub fn pair(&self) -> CoinPair {
        self.pair
    }

    /// Current parameters.
    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    /// The running round.
    pub fn round(&self) -> &Round {
        &self.round
    }

    /// Ledger account collecting this pair's reward fees.
    pub fn fee_account(&self) -> Address {
        self.fee_account
    }

    /// Block of the last accepted publication.
    pub fn last_publication_block(&self) -> u64 {
        self.last_publication_block
    }

    /// Timestamp of the last accepted publication.
    pub fn publication_timestamp(&self) -> u64 {
        self.publication_timestamp
    }

    /// Fees available for the next switch.
    pub fn available_reward_fees(&self, ledger: &dyn CollateralLedger) -> Amount {
        ledger.balance_of(&self.fee_account)
    }

    /// Whether `owner` is subscribed.
    pub fn is_subscribed(&self, owner: &Address) -> bool {
        self.subscribed.contains(owner)
    }

    /// Subscribed owners.
    pub fn subscribed(&self) -> impl Iterator<Item = &Address> + '_ {
        self.subscribed.iter()
    }

    /// Accounts allowed to read the price.
    pub fn read_whitelist(&self) -> impl Iterator<Item = &Address> + '_ {
        self.read_whitelist.iter()
    }

    /// Accounts allowed to publish emergency prices.
    pub fn emergency_whitelist(&self) -> impl Iterator<Item = &Address> + '_ {
        self.emergency_whitelist.iter()
    }

    /// Round summary.
    pub fn round_info(&self) -> RoundInfo {
        RoundInfo {
            number: self.round.number,
            lock_until: self.round.lock_until,
            selected: self.round.members.iter().map(|m| m.address).collect(),
            total_points: self.round.total_points(),
            below_minimum: self.round.below_minimum,
        }
    }

    /// Round state of the oracle reporting from `address`.
    pub fn oracle_round_info(&self, address: &Address) -> OracleRoundInfo {
        match self.round.member_by_address(address) {
            Some(member) => OracleRoundInfo {
                points: member.points,
                selected: true,
                excluded: member.excluded,
            },
            None => OracleRoundInfo::default(),
        }
    }

    /// Whether `owner` has sat out at least `num_idle_rounds` switches:
    /// not a member now, and not selected in any of the last
    /// `num_idle_rounds` rounds.
    pub fn is_idle(&self, owner: &Address, num_idle_rounds: u64) -> bool {
        if self.round.contains_owner(owner) {
            return false;
        }
        match self.last_selected.get(owner) {
            Some(round) => self.round.number >= round.saturating_add(num_idle_rounds),
            None => true,
        }
    }

    /// Subscribe `owner`'s oracle.
    ///
    /// When the list is full, the newcomer takes the place of the lowest
    /// staked subscriber if it has strictly more stake. When the round has
    /// a free seat, the newcomer joins it immediately.
    pub fn subscribe(&mut self, owner: Address, registry: &OracleRegistry) -> Result<SubscribeOutcome> {
        let entry = registry.get(&owner).ok_or(RoundError::NotRegistered(owner))?;
        if self.subscribed.contains(&owner) {
            return Err(RoundError::AlreadySubscribed(owner));
        }

        let mut evicted = None;
        if self.subscribed.len() >= self.config.max_subscribed_oracles {
            let tail = registry
                .iter()
                .filter(|e| self.subscribed.contains(&e.owner))
                .last()
                .map(|e| (e.owner, e.stake));
            if let Some((tail_owner, tail_stake)) = tail {
                if entry.stake <= tail_stake {
                    return Err(RoundError::NotEnoughStakeToAdd {
                        stake: entry.stake,
                        min_stake: tail_stake,
                    });
                }
                evicted = Some(tail_owner);
            }
        }

        if let Some(tail_owner) = evicted {
            self.subscribed.remove(&tail_owner);
            self.round.set_excluded(&tail_owner, true);
            warn!(pair = %self.pair, evicted = ?tail_owner, by = ?owner, "subscriber evicted from full list");
        }
        self.subscribed.insert(owner);

        let mut joined_round = false;
        if self.round.contains_owner(&owner) {
            self.round.set_excluded(&owner, false);
        } else if self.round.members.len() < self.config.max_oracles_per_round {
            self.seat(owner, entry.address);
            joined_round = true;
        }
        debug!(pair = %self.pair, ?owner, joined_round, "oracle subscribed");
        Ok(SubscribeOutcome {
            evicted,
            joined_round,
        })
    }

    /// Unsubscribe `owner`. A member keeps its seat and points until the switch.
    pub fn unsubscribe(&mut self, owner: Address) -> Result<()> {
        if !self.subscribed.remove(&owner) {
            return Err(RoundError::NotSubscribed(owner));
        }
        self.round.set_excluded(&owner, true);
        debug!(pair = %self.pair, ?owner, "oracle unsubscribed");
        Ok(())
    }

    /// Unsubscribe `owner` and take away its seat, forfeiting its points.
    /// Returns whether it held a seat.
    pub fn expel(&mut self, owner: &Address) -> bool {
        self.subscribed.remove(owner);
        match self.round.remove_owner(owner) {
            Some(member) => {
                warn!(pair = %self.pair, ?owner, forfeited = member.points, "oracle expelled from round");
                true
            }
            None => false,
        }
    }

    /// React to `owner`'s stake having dropped.
    ///
    /// If `owner` holds a seat and the best-staked waiting subscriber now
    /// has strictly more stake, the two swap; the leaving member's points
    /// are forfeited.
    pub fn on_stake_decreased(&mut self, owner: &Address, registry: &OracleRegistry) -> Option<Replacement> {
        if !self.round.contains_owner(owner) {
            return None;
        }
        let stake = registry.get(owner)?.stake;
        let candidate = registry
            .iter()
            .find(|e| self.subscribed.contains(&e.owner) && !self.round.contains_owner(&e.owner))?;
        if candidate.stake <= stake {
            return None;
        }
        let (added, address) = (candidate.owner, candidate.address);

        let removed = self.round.remove_owner(owner)?;
        self.seat(added, address);
        warn!(
            pair = %self.pair,
            removed = ?owner,
            forfeited = removed.points,
            ?added,
            "round member replaced after stake decrease"
        );
        Some(Replacement {
            removed: *owner,
            added,
        })
    }

    /// Accept a quorum-certified price.
    ///
    /// Checks, in order: message version, pair, price, that the caller is
    /// the voted oracle, the last publication block, that the caller is a
    /// member, the signature count, then each signature.
    pub fn publish_price(
        &mut self,
        caller: Address,
        message: &PriceMessage,
        signatures: &[Signature],
        ctx: BlockContext,
    ) -> Result<PublishOutcome> {
        if message.version != PRICE_MESSAGE_VERSION {
            return Err(RoundError::UnsupportedVersion {
                version: message.version,
            });
        }
        if message.pair != self.pair {
            return Err(RoundError::PairMismatch {
                expected: self.pair,
                got: message.pair,
            });
        }
        if message.price.is_zero() {
            return Err(RoundError::ZeroPrice);
        }
        if caller != message.voted_oracle {
            return Err(RoundError::NotVotedOracle {
                caller,
                voted: message.voted_oracle,
            });
        }
        if message.last_publication_block != self.last_publication_block {
            return Err(RoundError::StaleBlock {
                expected: self.last_publication_block,
                got: message.last_publication_block,
            });
        }
        if ctx.number <= self.last_publication_block {
            return Err(RoundError::AlreadyPublishedInBlock { block: ctx.number });
        }
        let owner = self
            .round
            .member_by_address(&caller)
            .map(|m| m.owner)
            .ok_or(RoundError::VoterNotInRound(caller))?;

        let members = self.round.members.len();
        if signatures.len() <= members / 2 {
            return Err(RoundError::NotEnoughSignatures {
                got: signatures.len(),
                members,
            });
        }
        let round = &self.round;
        let signers = verify_signatures(&message.signing_hash(), signatures, |signer| {
            round.member_by_address(signer).is_some()
        })?;

        let points = match self.round.member_mut(&owner) {
            Some(member) => {
                member.points += 1;
                member.points
            }
            None => return Err(RoundError::VoterNotInRound(caller)),
        };
        self.current_price = message.price;
        self.last_publication_block = ctx.number;
        self.publication_timestamp = ctx.timestamp;
        debug!(
            pair = %self.pair,
            voted = ?caller,
            price = %message.price,
            block = ctx.number,
            signatures = signers.len(),
            "price published"
        );
        Ok(PublishOutcome {
            owner,
            points,
            signers,
        })
    }

    /// Publish without a quorum once publications have stalled.
    pub fn emergency_publish(&mut self, caller: Address, price: Amount, ctx: BlockContext) -> Result<()> {
        if !self.emergency_whitelist.contains(&caller) {
            return Err(RoundError::NotWhitelisted(caller));
        }
        if price.is_zero() {
            return Err(RoundError::ZeroPrice);
        }
        let period = self.config.emergency_publishing_period_in_blocks;
        if ctx.number < self.last_publication_block.saturating_add(period) {
            return Err(RoundError::EmergencyPeriodNotStarted {
                last_publication_block: self.last_publication_block,
                period,
            });
        }
        self.current_price = price;
        self.last_publication_block = ctx.number;
        self.publication_timestamp = ctx.timestamp;
        warn!(pair = %self.pair, ?caller, %price, block = ctx.number, "emergency price published");
        Ok(())
    }

    /// Current price and whether it is still within the validity window.
    pub fn peek(&self, caller: &Address, ctx: BlockContext) -> Result<(Amount, bool)> {
        if !self.read_whitelist.contains(caller) {
            return Err(RoundError::NotWhitelisted(*caller));
        }
        let age = ctx.number.saturating_sub(self.last_publication_block);
        Ok((
            self.current_price,
            age <= self.config.valid_price_period_in_blocks,
        ))
    }

    /// Current price, failing if it is no longer valid.
    pub fn get_price(&self, caller: &Address, ctx: BlockContext) -> Result<Amount> {
        let (price, valid) = self.peek(caller, ctx)?;
        if !valid {
            return Err(RoundError::PriceExpired {
                last_publication_block: self.last_publication_block,
            });
        }
        Ok(price)
    }

    /// End the running round and start the next one.
    ///
    /// Pays each member `points * fees / total_points` from the fee
    /// account, then selects the highest-staked subscribers for the new
    /// round. With no points earned nothing is paid and fees carry over.
    pub fn switch_round(
        &mut self,
        registry: &OracleRegistry,
        ledger: &mut dyn CollateralLedger,
        ctx: BlockContext,
    ) -> Result<SwitchOutcome> {
        if ctx.timestamp <= self.round.lock_until {
            return Err(RoundError::RoundLockActive {
                lock_until: self.round.lock_until,
            });
        }
        let lock_until = ctx
            .timestamp
            .checked_add(self.config.round_lock_period_secs)
            .ok_or(RoundError::Overflow)?;

        let payouts = self.compute_payouts(ledger)?;
        let distributed = self.pay(ledger, &payouts)?;

        let selected: Vec<(Address, Address)> = registry
            .iter()
            .filter(|e| self.subscribed.contains(&e.owner))
            .take(self.config.max_oracles_per_round)
            .map(|e| (e.owner, e.address))
            .collect();

        let previous_round = self.round.number;
        let number = previous_round + 1;
        let below_minimum = selected.len() < self.config.min_oracles_per_round;
        self.round = Round {
            number,
            lock_until,
            members: selected
                .iter()
                .map(|(owner, address)| RoundMember {
                    owner: *owner,
                    address: *address,
                    points: 0,
                    excluded: false,
                })
                .collect(),
            below_minimum,
        };
        for (owner, _) in &selected {
            self.last_selected.insert(*owner, number);
        }

        if below_minimum {
            warn!(
                pair = %self.pair,
                round = number,
                selected = selected.len(),
                min = self.config.min_oracles_per_round,
                "round formed below minimum size"
            );
        }
        info!(
            pair = %self.pair,
            round = number,
            lock_until,
            selected = selected.len(),
            %distributed,
            "new round"
        );
        Ok(SwitchOutcome {
            previous_round,
            round: number,
            lock_until,
            selected,
            payouts,
            distributed,
            below_minimum,
        })
    }

    /// Set the minimum round size.
    pub fn set_min_oracles_per_round(&mut self, value: usize) -> Result<()> {
        self.update_config(|c| c.min_oracles_per_round = value)
    }

    /// Set the round size cap.
    ///
    /// A running round above the new cap keeps its members and accepts no
    /// mid-round joins; the next switch selects at most `value`.
    pub fn set_max_oracles_per_round(&mut self, value: usize) -> Result<()> {
        self.update_config(|c| c.max_oracles_per_round = value)
    }

    /// Set the subscription list cap.
    ///
    /// Subscribers beyond the new cap are dropped from the list, lowest
    /// stake first. A dropped member keeps its seat until the switch, as
    /// after an unsubscribe. Returns the dropped owners.
    pub fn set_max_subscribed_oracles(
        &mut self,
        value: usize,
        registry: &OracleRegistry,
    ) -> Result<Vec<Address>> {
        self.update_config(|c| c.max_subscribed_oracles = value)?;
        let excess = self.subscribed.len().saturating_sub(value);
        if excess == 0 {
            return Ok(Vec::new());
        }
        let ranked: Vec<Address> = registry
            .iter()
            .filter(|e| self.subscribed.contains(&e.owner))
            .map(|e| e.owner)
            .collect();
        let dropped: Vec<Address> = ranked.into_iter().rev().take(excess).collect();
        for owner in &dropped {
            self.subscribed.remove(owner);
            self.round.set_excluded(owner, true);
        }
        warn!(pair = %self.pair, cap = value, dropped = dropped.len(), "subscription list trimmed to new cap");
        Ok(dropped)
    }

    /// Set the round lock period. Applies from the next switch.
    pub fn set_round_lock_period(&mut self, secs: u64) -> Result<()> {
        self.update_config(|c| c.round_lock_period_secs = secs)
    }

    /// Set the price validity window.
    pub fn set_valid_price_period(&mut self, blocks: u64) -> Result<()> {
        self.update_config(|c| c.valid_price_period_in_blocks = blocks)
    }

    /// Set the emergency publishing period.
    pub fn set_emergency_publishing_period(&mut self, blocks: u64) -> Result<()> {
        self.update_config(|c| c.emergency_publishing_period_in_blocks = blocks)
    }

    /// Allow `account` to read the price.
    pub fn add_to_read_whitelist(&mut self, account: Address) -> Result<()> {
        insert_unique(&mut self.read_whitelist, account)
    }

    /// Revoke read access.
    pub fn remove_from_read_whitelist(&mut self, account: Address) -> Result<()> {
        if !self.read_whitelist.remove(&account) {
            return Err(RoundError::NotWhitelisted(account));
        }
        Ok(())
    }

    /// Allow `account` to publish emergency prices.
    pub fn add_to_emergency_whitelist(&mut self, account: Address) -> Result<()> {
        insert_unique(&mut self.emergency_whitelist, account)
    }

    /// Revoke emergency publishing.
    pub fn remove_from_emergency_whitelist(&mut self, account: Address) -> Result<()> {
        if !self.emergency_whitelist.remove(&account) {
            return Err(RoundError::NotWhitelisted(account));
        }
        Ok(())
    }

    fn update_config(&mut self, apply: impl FnOnce(&mut RoundConfig)) -> Result<()> {
        let mut config = self.config.clone();
        apply(&mut config);
        config.validate()?;
        self.config = config;
        Ok(())
    }

    fn seat(&mut self, owner: Address, address: Address) {
        self.round.members.push(RoundMember {
            owner,
            address,
            points: 0,
            excluded: false,
        });
        self.last_selected.insert(owner, self.round.number);
    }

    /// Transfer every payout or none. Recipients are checked for overflow
    /// up front; a transfer that still fails rolls back the ones before it.
    fn pay(&self, ledger: &mut dyn CollateralLedger, payouts: &[RewardPayout]) -> Result<Amount> {
        let mut distributed = Amount::zero();
        for payout in payouts {
            ledger
                .balance_of(&payout.owner)
                .checked_add(payout.amount)
                .ok_or(RoundError::Overflow)?;
            distributed = distributed
                .checked_add(payout.amount)
                .ok_or(RoundError::Overflow)?;
        }

        for (done, payout) in payouts.iter().enumerate() {
            if let Err(e) = ledger.transfer(self.fee_account, payout.owner, payout.amount) {
                for paid in payouts[..done].iter().rev() {
                    if let Err(undo) = ledger.transfer(paid.owner, self.fee_account, paid.amount) {
                        error!(pair = %self.pair, owner = ?paid.owner, %undo, "reward rollback failed");
                    }
                }
                warn!(pair = %self.pair, owner = ?payout.owner, %e, "reward transfer failed, switch aborted");
                return Err(e.into());
            }
        }
        Ok(distributed)
    }

    fn compute_payouts(&self, ledger: &dyn CollateralLedger) -> Result<Vec<RewardPayout>> {
        let total_points = self.round.total_points();
        let fees = ledger.balance_of(&self.fee_account);
        if total_points == 0 || fees.is_zero() {
            return Ok(Vec::new());
        }
        let total = Amount::from(total_points);
        let mut payouts = Vec::new();
        for member in self.round.members.iter().filter(|m| m.points > 0) {
            let amount = mul_div(Amount::from(member.points), fees, total).ok_or(RoundError::Overflow)?;
            if amount.is_zero() {
                continue;
            }
            payouts.push(RewardPayout {
                owner: member.owner,
                address: member.address,
                points: member.points,
                amount,
            });
        }
        Ok(payouts)
    }
}

fn insert_unique(set: &mut BTreeSet<Address>, account: Address) -> Result<()> {
    if account.is_zero() {
        return Err(RoundError::ZeroAddress);
    }
    if !set.insert(account) {
        return Err(RoundError::AlreadyWhitelisted(account));
    }
    Ok(())
}
