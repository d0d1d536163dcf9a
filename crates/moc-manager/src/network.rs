//! The oracle network facade.
//!
//! `OracleNetwork` owns the registry, the staking component and one
//! [`CoinPairPrice`] per tracked pair. Every mutation goes through a
//! `&mut self` method, so a single owner serializes them; each committed
//! mutation records its protocol events, a rejected one records none.

use std::collections::BTreeMap;

use moc_crypto::keccak::keccak256;
use moc_crypto::{PriceMessage, Signature};
use moc_registry::{OracleEntry, OracleRegistry, RegistryError};
use moc_round::{CoinPairPrice, OracleRoundInfo, PublishOutcome, RoundInfo, SwitchOutcome};
use moc_staking::{
    CollateralLedger, DelayMachine, DelayedPayment, DepositReceipt, StakeLock, Staking,
    StakingConfig, VestingSchedule, WithdrawReceipt,
};
use moc_types::events::Event;
use moc_types::{Address, Amount, BlockContext, CoinPair};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::coordinator::{StakeChange, SubscriptionCoordinator, DEFAULT_NUM_IDLE_ROUNDS};
use crate::governance::{ChangeAuthorizer, Governor, ProtocolChange};
use crate::{ManagerError, Result};

/// Ledger account of a protocol component, derived from its label.
pub fn system_account(label: &str) -> Address {
    let seed = format!("moc.{label}");
    Address::from_slice(&keccak256(seed.as_bytes()).as_bytes()[12..])
}

/// Ledger account of the staking pool. Depositors approve this account.
pub fn staking_account() -> Address {
    system_account("staking")
}

/// Ledger account of the delay vault.
pub fn delay_vault_account() -> Address {
    system_account("delay")
}

/// Network-wide parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Owner of the governor that authorizes protocol changes.
    #[serde(default)]
    pub governor: Address,
    /// Stake required to subscribe to a pair.
    #[serde(default)]
    pub min_subscription_stake: Amount,
    /// Round switches an oracle must sit out before it can be removed.
    #[serde(default = "default_num_idle_rounds")]
    pub num_idle_rounds: u64,
    /// Staking parameters.
    #[serde(flatten)]
    pub staking: StakingConfig,
}

fn default_num_idle_rounds() -> u64 {
    DEFAULT_NUM_IDLE_ROUNDS
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            governor: Address::zero(),
            min_subscription_stake: Amount::zero(),
            num_idle_rounds: default_num_idle_rounds(),
            staking: StakingConfig::default(),
        }
    }
}

impl NetworkConfig {
    /// Check the parameters.
    pub fn validate(&self) -> Result<()> {
        if self.governor.is_zero() {
            return Err(ManagerError::InvalidConfig(
                "governor must not be 0x0".to_string(),
            ));
        }
        if self.staking.vesting_period_blocks == 0 {
            return Err(ManagerError::InvalidConfig(
                "vesting period must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// The oracle network.
pub struct OracleNetwork {
    registry: OracleRegistry,
    staking: Staking,
    pairs: BTreeMap<CoinPair, CoinPairPrice>,
    coordinator: SubscriptionCoordinator,
    authorizer: Box<dyn ChangeAuthorizer>,
    events: Vec<Event>,
}

impl OracleNetwork {
    /// Create a network with no pairs, holding collateral on `ledger`.
    pub fn new(config: &NetworkConfig, ledger: Box<dyn CollateralLedger>) -> Result<Self> {
        config.validate()?;
        let vault = Box::new(DelayMachine::new(delay_vault_account()));
        let staking = Staking::new(staking_account(), &config.staking, ledger, vault)?;
        info!(governor = ?config.governor, "oracle network created");
        Ok(Self {
            registry: OracleRegistry::new(),
            staking,
            pairs: BTreeMap::new(),
            coordinator: SubscriptionCoordinator::new(
                config.min_subscription_stake,
                config.num_idle_rounds,
            ),
            authorizer: Box::new(Governor::new(config.governor)),
            events: Vec::new(),
        })
    }

    /// Replace the governor with another authorizer.
    pub fn with_authorizer(mut self, authorizer: Box<dyn ChangeAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    // ---- Registry ----

    /// Register `caller`'s oracle. Its stake is the caller's own staking balance.
    pub fn register_oracle(
        &mut self,
        caller: Address,
        address: Address,
        name: String,
        ctx: BlockContext,
    ) -> Result<()> {
        let stake = self.staking.get_balance(&caller, ctx);
        self.registry
            .register(caller, address, name.clone(), stake, None)?;
        info!(owner = ?caller, ?address, %stake, "oracle registered");
        self.events.push(Event::OracleRegistered {
            owner: caller,
            address,
            name,
        });
        Ok(())
    }

    /// Change the internet name of `caller`'s oracle.
    pub fn set_oracle_name(&mut self, caller: Address, name: String) -> Result<()> {
        self.registry.set_name(caller, name.clone())?;
        self.events.push(Event::OracleNameChanged {
            owner: caller,
            name,
        });
        Ok(())
    }

    /// Remove `caller`'s oracle once it has sat out enough rounds on every
    /// pair. Remaining subscriptions are dropped; the stake stays in the pool.
    pub fn remove_oracle(&mut self, caller: Address) -> Result<OracleEntry> {
        if !self.registry.is_registered(&caller) {
            return Err(RegistryError::NotRegistered(caller).into());
        }
        if !self.coordinator.can_remove_oracle(&caller, &self.pairs) {
            return Err(ManagerError::NotReadyToRemove { owner: caller });
        }

        let mut dropped = Vec::new();
        for (pair, cpp) in self.pairs.iter_mut() {
            if cpp.is_subscribed(&caller) {
                cpp.unsubscribe(caller)?;
                dropped.push(*pair);
            }
        }
        let entry = self.registry.remove(caller)?;
        for pair in dropped {
            self.events.push(Event::OracleUnsubscribed {
                owner: caller,
                pair,
            });
        }
        info!(owner = ?caller, address = ?entry.address, "oracle removed");
        self.events.push(Event::OracleRemoved {
            owner: caller,
            address: entry.address,
        });
        Ok(entry)
    }

    // ---- Subscriptions ----

    /// Subscribe `caller`'s oracle to `pair`.
    pub fn subscribe(&mut self, caller: Address, pair: CoinPair, ctx: BlockContext) -> Result<()> {
        if !self.pairs.contains_key(&pair) {
            return Err(ManagerError::UnknownPair(pair));
        }
        self.refresh_stakes(ctx)?;
        let cpp = self
            .pairs
            .get_mut(&pair)
            .ok_or(ManagerError::UnknownPair(pair))?;
        let outcome = self.coordinator.subscribe(caller, cpp, &mut self.registry)?;
        let round = cpp.round().number;

        if let Some(evicted) = outcome.evicted {
            self.events.push(Event::OracleUnsubscribed {
                owner: evicted,
                pair,
            });
        }
        self.events.push(Event::OracleSubscribed {
            owner: caller,
            pair,
        });
        if outcome.joined_round {
            self.events.push(Event::OracleJoinedRound {
                owner: caller,
                pair,
                round,
            });
        }
        Ok(())
    }

    /// Unsubscribe `caller`'s oracle from `pair`.
    pub fn unsubscribe(&mut self, caller: Address, pair: CoinPair) -> Result<()> {
        let cpp = self
            .pairs
            .get_mut(&pair)
            .ok_or(ManagerError::UnknownPair(pair))?;
        self.coordinator.unsubscribe(caller, cpp, &mut self.registry)?;
        self.events.push(Event::OracleUnsubscribed {
            owner: caller,
            pair,
        });
        Ok(())
    }

    // ---- Staking ----

    /// Deposit `amount` from `caller` into `beneficiary`'s own account.
    pub fn deposit(
        &mut self,
        caller: Address,
        amount: Amount,
        beneficiary: Address,
        ctx: BlockContext,
    ) -> Result<DepositReceipt> {
        let receipt = self.staking.deposit(caller, amount, beneficiary, ctx)?;
        self.record_deposit(&receipt);
        self.refresh_stakes(ctx)?;
        Ok(receipt)
    }

    /// Deposit `amount` from `caller` into its `subaccount`.
    pub fn stake_at(
        &mut self,
        caller: Address,
        amount: Amount,
        subaccount: Address,
        ctx: BlockContext,
    ) -> Result<DepositReceipt> {
        let receipt = self.staking.stake_at(caller, amount, subaccount, ctx)?;
        self.record_deposit(&receipt);
        self.refresh_stakes(ctx)?;
        Ok(receipt)
    }

    /// Withdraw up to `amount` of collateral from `caller`'s own account.
    pub fn withdraw(&mut self, caller: Address, amount: Amount, ctx: BlockContext) -> Result<WithdrawReceipt> {
        let receipt = self.staking.withdraw(caller, amount, ctx)?;
        self.record_withdrawal(&receipt);
        self.refresh_stakes(ctx)?;
        Ok(receipt)
    }

    /// Withdraw up to `amount` of collateral from `caller`'s `subaccount`.
    pub fn withdraw_from(
        &mut self,
        caller: Address,
        amount: Amount,
        subaccount: Address,
        ctx: BlockContext,
    ) -> Result<WithdrawReceipt> {
        let receipt = self.staking.withdraw_from(caller, amount, subaccount, ctx)?;
        self.record_withdrawal(&receipt);
        self.refresh_stakes(ctx)?;
        Ok(receipt)
    }

    /// Burn `shares` of `caller`'s own account.
    pub fn withdraw_shares(&mut self, caller: Address, shares: Amount, ctx: BlockContext) -> Result<WithdrawReceipt> {
        let receipt = self.staking.withdraw_shares(caller, shares, ctx)?;
        self.record_withdrawal(&receipt);
        self.refresh_stakes(ctx)?;
        Ok(receipt)
    }

    /// Start vesting `amount` from `caller` into the pool.
    pub fn distribute(&mut self, caller: Address, amount: Amount, ctx: BlockContext) -> Result<VestingSchedule> {
        let schedule = self.staking.distribute(caller, amount, ctx)?;
        self.events.push(Event::PayEarnings {
            earnings: schedule.amount,
            start: schedule.start,
            end: schedule.end,
        });
        Ok(schedule)
    }

    /// Lock `owner`'s current balance until `until`. Lockers only.
    pub fn lock_stake(
        &mut self,
        caller: Address,
        owner: Address,
        until: u64,
        ctx: BlockContext,
    ) -> Result<StakeLock> {
        let lock = self.staking.lock_stake(caller, owner, until, ctx)?;
        self.events.push(Event::StakeLocked {
            owner,
            amount: lock.amount,
            until: lock.until,
        });
        Ok(lock)
    }

    /// Collect an unlocked delayed withdrawal.
    pub fn withdraw_delayed(&mut self, caller: Address, id: u64, ctx: BlockContext) -> Result<DelayedPayment> {
        let payment = self.staking.withdraw_delayed(caller, id, ctx)?;
        self.events.push(Event::DelayedPaymentReleased {
            id,
            beneficiary: payment.beneficiary,
            amount: payment.amount,
        });
        Ok(payment)
    }

    // ---- Prices and rounds ----

    /// Submit a quorum-certified price for the message's pair.
    pub fn publish_price(
        &mut self,
        caller: Address,
        message: &PriceMessage,
        signatures: &[Signature],
        ctx: BlockContext,
    ) -> Result<PublishOutcome> {
        let outcome = self
            .pair_mut(&message.pair)?
            .publish_price(caller, message, signatures, ctx)?;
        self.events.push(Event::PricePublished {
            pair: message.pair,
            sender: caller,
            voted_oracle: message.voted_oracle,
            price: message.price,
            block: ctx.number,
        });
        Ok(outcome)
    }

    /// Publish `price` for `pair` without a quorum. Emergency whitelist only.
    pub fn emergency_publish(
        &mut self,
        caller: Address,
        pair: CoinPair,
        price: Amount,
        ctx: BlockContext,
    ) -> Result<()> {
        self.pair_mut(&pair)?.emergency_publish(caller, price, ctx)?;
        self.events.push(Event::EmergencyPricePublished {
            pair,
            sender: caller,
            price,
            block: ctx.number,
        });
        Ok(())
    }

    /// Pay the running round of `pair` and start the next one.
    pub fn switch_round(&mut self, caller: Address, pair: CoinPair, ctx: BlockContext) -> Result<SwitchOutcome> {
        if !self.pairs.contains_key(&pair) {
            return Err(ManagerError::UnknownPair(pair));
        }
        self.refresh_stakes(ctx)?;
        let cpp = self
            .pairs
            .get_mut(&pair)
            .ok_or(ManagerError::UnknownPair(pair))?;
        let outcome = cpp.switch_round(&self.registry, self.staking.ledger_mut(), ctx)?;

        for payout in &outcome.payouts {
            self.events.push(Event::OracleRewardTransfer {
                pair,
                round: outcome.previous_round,
                owner: payout.owner,
                address: payout.address,
                amount: payout.amount,
            });
        }
        self.events.push(Event::NewRound {
            pair,
            caller,
            number: outcome.round,
            lock_until: outcome.lock_until,
            selected: outcome.selected.iter().map(|(_, address)| *address).collect(),
        });
        Ok(outcome)
    }

    /// Current price of `pair` and whether it is still valid.
    pub fn peek(&self, caller: &Address, pair: &CoinPair, ctx: BlockContext) -> Result<(Amount, bool)> {
        Ok(self.pair(pair)?.peek(caller, ctx)?)
    }

    /// Current valid price of `pair`.
    pub fn get_price(&self, caller: &Address, pair: &CoinPair, ctx: BlockContext) -> Result<Amount> {
        Ok(self.pair(pair)?.get_price(caller, ctx)?)
    }

    // ---- Governance ----

    /// Apply `change` if the authorizer accepts `caller`.
    pub fn execute_change(&mut self, caller: Address, change: ProtocolChange, ctx: BlockContext) -> Result<()> {
        if !self.authorizer.authorize(&caller, &change) {
            return Err(ManagerError::NotAuthorizedChanger(caller));
        }
        self.apply_change(&change, ctx)?;
        info!(?caller, change = change.name(), "protocol change executed");
        self.events.push(Event::ProtocolChangeExecuted {
            caller,
            change: change.name().to_string(),
        });
        Ok(())
    }

    fn apply_change(&mut self, change: &ProtocolChange, ctx: BlockContext) -> Result<()> {
        match change {
            ProtocolChange::RegisterPair { pair, config } => {
                if self.pairs.contains_key(pair) {
                    return Err(ManagerError::PairAlreadyRegistered(*pair));
                }
                let cpp = CoinPairPrice::new(*pair, config.clone(), ctx)?;
                self.pairs.insert(*pair, cpp);
            }
            ProtocolChange::SetMinOraclesPerRound { pair, value } => {
                self.pair_mut(pair)?.set_min_oracles_per_round(*value)?
            }
            ProtocolChange::SetMaxOraclesPerRound { pair, value } => {
                self.pair_mut(pair)?.set_max_oracles_per_round(*value)?
            }
            ProtocolChange::SetMaxSubscribedOracles { pair, value } => {
                self.pair_mut(pair)?;
                self.refresh_stakes(ctx)?;
                let cpp = self
                    .pairs
                    .get_mut(pair)
                    .ok_or(ManagerError::UnknownPair(*pair))?;
                let evicted = cpp.set_max_subscribed_oracles(*value, &self.registry)?;
                for owner in evicted {
                    self.registry.remove_subscription(owner, pair)?;
                    self.events.push(Event::OracleUnsubscribed { owner, pair: *pair });
                }
            }
            ProtocolChange::SetRoundLockPeriod { pair, secs } => {
                self.pair_mut(pair)?.set_round_lock_period(*secs)?
            }
            ProtocolChange::SetValidPricePeriod { pair, blocks } => {
                self.pair_mut(pair)?.set_valid_price_period(*blocks)?
            }
            ProtocolChange::SetEmergencyPublishingPeriod { pair, blocks } => {
                self.pair_mut(pair)?.set_emergency_publishing_period(*blocks)?
            }
            ProtocolChange::AddToReadWhitelist { pair, account } => {
                self.pair_mut(pair)?.add_to_read_whitelist(*account)?
            }
            ProtocolChange::RemoveFromReadWhitelist { pair, account } => {
                self.pair_mut(pair)?.remove_from_read_whitelist(*account)?
            }
            ProtocolChange::AddToEmergencyWhitelist { pair, account } => {
                self.pair_mut(pair)?.add_to_emergency_whitelist(*account)?
            }
            ProtocolChange::RemoveFromEmergencyWhitelist { pair, account } => {
                self.pair_mut(pair)?.remove_from_emergency_whitelist(*account)?
            }
            ProtocolChange::SetMinSubscriptionStake { amount } => {
                self.coordinator.set_min_subscription_stake(*amount)
            }
            ProtocolChange::SetNumIdleRounds { rounds } => {
                self.coordinator.set_num_idle_rounds(*rounds)
            }
            ProtocolChange::SetVestingPeriod { blocks } => self.staking.set_vesting_period(*blocks)?,
            ProtocolChange::SetWithdrawLockTime { secs } => {
                self.staking.set_withdraw_lock_time(*secs)
            }
            ProtocolChange::AddToStakingWhitelist { account } => {
                self.staking.add_to_whitelist(*account)?
            }
            ProtocolChange::RemoveFromStakingWhitelist { account } => {
                self.staking.remove_from_whitelist(*account)?
            }
            ProtocolChange::AddLocker { account } => self.staking.add_locker(*account)?,
            ProtocolChange::RemoveLocker { account } => self.staking.remove_locker(*account)?,
        }
        Ok(())
    }

    // ---- Reads ----

    /// The oracle registry.
    pub fn registry(&self) -> &OracleRegistry {
        &self.registry
    }

    /// The staking component.
    pub fn staking(&self) -> &Staking {
        &self.staking
    }

    /// The collateral ledger.
    pub fn ledger(&self) -> &dyn CollateralLedger {
        self.staking.ledger()
    }

    /// The collateral ledger, for transfers and approvals made by account holders.
    pub fn ledger_mut(&mut self) -> &mut dyn CollateralLedger {
        self.staking.ledger_mut()
    }

    /// Subscription coordinator.
    pub fn coordinator(&self) -> &SubscriptionCoordinator {
        &self.coordinator
    }

    /// Round state machine of `pair`.
    pub fn pair(&self, pair: &CoinPair) -> Result<&CoinPairPrice> {
        self.pairs.get(pair).ok_or(ManagerError::UnknownPair(*pair))
    }

    /// Tracked pairs.
    pub fn pairs(&self) -> impl Iterator<Item = &CoinPairPrice> + '_ {
        self.pairs.values()
    }

    /// Registry entry of `owner`'s oracle.
    pub fn get_oracle_registration_info(&self, owner: &Address) -> Option<&OracleEntry> {
        self.registry.get(owner)
    }

    /// Whether `owner` has a registered oracle.
    pub fn is_oracle_registered(&self, owner: &Address) -> bool {
        self.registry.is_registered(owner)
    }

    /// Owner of the oracle reporting from `address`.
    pub fn get_oracle_owner(&self, address: &Address) -> Option<Address> {
        self.registry.owner_of(address)
    }

    /// Whether `owner` is subscribed to `pair`.
    pub fn is_subscribed(&self, owner: &Address, pair: &CoinPair) -> Result<bool> {
        Ok(self.pair(pair)?.is_subscribed(owner))
    }

    /// Whether `owner`'s oracle may be removed now.
    pub fn can_remove_oracle(&self, owner: &Address) -> bool {
        self.registry.is_registered(owner) && self.coordinator.can_remove_oracle(owner, &self.pairs)
    }

    /// Current round of `pair`.
    pub fn get_round_info(&self, pair: &CoinPair) -> Result<RoundInfo> {
        Ok(self.pair(pair)?.round_info())
    }

    /// Round standing of the oracle at `address` in `pair`.
    pub fn get_oracle_round_info(&self, pair: &CoinPair, address: &Address) -> Result<OracleRoundInfo> {
        Ok(self.pair(pair)?.oracle_round_info(address))
    }

    /// Fees the next switch of `pair` will distribute.
    pub fn available_reward_fees(&self, pair: &CoinPair) -> Result<Amount> {
        Ok(self.pair(pair)?.available_reward_fees(self.staking.ledger()))
    }

    /// Collateral owned by `owner` through its pool shares.
    pub fn get_balance(&self, owner: &Address, ctx: BlockContext) -> Amount {
        self.staking.get_balance(owner, ctx)
    }

    /// Collateral held in `owner`'s `subaccount`.
    pub fn get_balance_at(&self, owner: &Address, subaccount: &Address, ctx: BlockContext) -> Amount {
        self.staking.get_balance_at(owner, subaccount, ctx)
    }

    /// Part of `owner`'s balance still under a stake lock.
    pub fn get_locked_balance(&self, owner: &Address, ctx: BlockContext) -> Amount {
        self.staking.get_locked_balance(owner, ctx)
    }

    /// Delayed withdrawals waiting for `beneficiary`.
    pub fn pending_withdrawals(&self, beneficiary: &Address) -> Vec<(u64, DelayedPayment)> {
        self.staking.pending_withdrawals(beneficiary)
    }

    /// Drain the events recorded since the last call, in commit order.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    fn pair_mut(&mut self, pair: &CoinPair) -> Result<&mut CoinPairPrice> {
        self.pairs
            .get_mut(pair)
            .ok_or(ManagerError::UnknownPair(*pair))
    }

    fn record_deposit(&mut self, receipt: &DepositReceipt) {
        if receipt.shares.is_zero() {
            return;
        }
        debug!(owner = ?receipt.account.owner, amount = %receipt.amount, shares = %receipt.shares, "stake deposited");
        self.events.push(Event::StakeDeposited {
            owner: receipt.account.owner,
            subaccount: receipt.account.subaccount,
            amount: receipt.amount,
            shares: receipt.shares,
        });
    }

    fn record_withdrawal(&mut self, receipt: &WithdrawReceipt) {
        if receipt.shares.is_zero() {
            return;
        }
        self.events.push(Event::StakeWithdrawn {
            owner: receipt.account.owner,
            subaccount: receipt.account.subaccount,
            amount: receipt.amount,
            shares: receipt.shares,
            delay_id: receipt.delay_id,
        });
    }

    /// Bring every registered oracle's stake up to its own staking balance,
    /// then push any drop into the rounds.
    ///
    /// Vesting raises every holder's balance without a staking call, so the
    /// registry is refreshed before anything reads its order.
    pub fn refresh_stakes(&mut self, ctx: BlockContext) -> Result<()> {
        let owners: Vec<Address> = self.registry.iter().map(|e| e.owner).collect();
        let mut dropped = Vec::new();
        for owner in owners {
            let stake = self.staking.get_balance(&owner, ctx);
            let current = self.registry.get(&owner).map(|e| e.stake);
            if current == Some(stake) {
                continue;
            }
            let previous = self.registry.set_stake(owner, stake, None)?;
            if stake < previous {
                dropped.push((owner, previous));
            }
        }
        for (owner, previous) in dropped {
            let change = self.coordinator.on_stake_decreased(
                &owner,
                previous,
                &mut self.registry,
                &mut self.pairs,
            )?;
            self.record_stake_change(&owner, change);
        }
        Ok(())
    }

    fn record_stake_change(&mut self, owner: &Address, change: StakeChange) {
        for (pair, seated) in change.expelled {
            self.events.push(Event::OracleUnsubscribed {
                owner: *owner,
                pair,
            });
            if seated {
                let round = self.round_number(&pair);
                self.events.push(Event::OracleLeftRound {
                    owner: *owner,
                    pair,
                    round,
                });
            }
        }
        for (pair, replacement) in change.replaced {
            let round = self.round_number(&pair);
            self.events.push(Event::OracleLeftRound {
                owner: replacement.removed,
                pair,
                round,
            });
            self.events.push(Event::OracleJoinedRound {
                owner: replacement.added,
                pair,
                round,
            });
        }
    }

    fn round_number(&self, pair: &CoinPair) -> u64 {
        self.pairs
            .get(pair)
            .map(|cpp| cpp.round().number)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moc_round::RoundConfig;
    use moc_staking::InMemoryLedger;

    fn governor() -> Address {
        Address::from_low_u64_be(0x90)
    }

    fn owner(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn reporter(n: u64) -> Address {
        Address::from_low_u64_be(0x1000 + n)
    }

    fn btc() -> CoinPair {
        CoinPair::from_name("BTCUSD").expect("pair")
    }

    fn ctx(block: u64) -> BlockContext {
        BlockContext::new(block, 1_000 + block * 30)
    }

    fn network(balances: &[(Address, u64)]) -> OracleNetwork {
        let mut ledger = InMemoryLedger::new();
        for (account, amount) in balances {
            ledger.mint(*account, Amount::from(*amount)).expect("mint");
            ledger.approve(*account, staking_account(), Amount::max_value());
        }
        let config = NetworkConfig {
            governor: governor(),
            min_subscription_stake: Amount::from(10),
            ..NetworkConfig::default()
        };
        let mut network = OracleNetwork::new(&config, Box::new(ledger)).expect("network");
        let round_config = RoundConfig {
            min_oracles_per_round: 1,
            max_oracles_per_round: 2,
            ..RoundConfig::default()
        };
        network
            .execute_change(
                governor(),
                ProtocolChange::RegisterPair {
                    pair: btc(),
                    config: round_config,
                },
                ctx(1),
            )
            .expect("register pair");
        network.take_events();
        network
    }

    fn staked_oracle(network: &mut OracleNetwork, n: u64, stake: u64) {
        network
            .deposit(owner(n), Amount::from(stake), owner(n), ctx(1))
            .expect("deposit");
        network
            .register_oracle(owner(n), reporter(n), format!("oracle-{n}.example"), ctx(1))
            .expect("register");
    }

    #[test]
    fn test_config_validation() {
        assert!(NetworkConfig::default().validate().is_err());
        let config = NetworkConfig {
            governor: governor(),
            ..NetworkConfig::default()
        };
        config.validate().expect("valid");
    }

    #[test]
    fn test_config_flattens_staking() {
        let config: NetworkConfig = serde_json::from_str(
            r#"{"governor":"0x0000000000000000000000000000000000000090","withdraw_lock_time_secs":10}"#,
        )
        .expect("config");
        assert_eq!(config.governor, governor());
        assert_eq!(config.staking.withdraw_lock_time_secs, 10);
        assert_eq!(config.staking.vesting_period_blocks, 10);
        assert_eq!(config.num_idle_rounds, DEFAULT_NUM_IDLE_ROUNDS);
    }

    #[test]
    fn test_unauthorized_change_rejected() {
        let mut network = network(&[]);
        let err = network
            .execute_change(owner(1), ProtocolChange::SetNumIdleRounds { rounds: 3 }, ctx(2))
            .expect_err("not governor");
        assert!(matches!(err, ManagerError::NotAuthorizedChanger(_)));
        assert!(network.take_events().is_empty());
        assert_eq!(network.coordinator().num_idle_rounds(), DEFAULT_NUM_IDLE_ROUNDS);
    }

    #[test]
    fn test_register_pair_twice_fails() {
        let mut network = network(&[]);
        let err = network
            .execute_change(
                governor(),
                ProtocolChange::RegisterPair {
                    pair: btc(),
                    config: RoundConfig::default(),
                },
                ctx(2),
            )
            .expect_err("duplicate");
        assert!(matches!(err, ManagerError::PairAlreadyRegistered(_)));
    }

    #[test]
    fn test_unknown_pair() {
        let mut network = network(&[]);
        let eth = CoinPair::from_name("ETHUSD").expect("pair");
        assert!(matches!(
            network.subscribe(owner(1), eth, ctx(1)),
            Err(ManagerError::UnknownPair(_))
        ));
        assert!(matches!(
            network.execute_change(
                governor(),
                ProtocolChange::SetRoundLockPeriod { pair: eth, secs: 5 },
                ctx(2)
            ),
            Err(ManagerError::UnknownPair(_))
        ));
    }

    #[test]
    fn test_registration_uses_staking_balance() {
        let mut network = network(&[(owner(1), 100), (owner(2), 40)]);
        staked_oracle(&mut network, 1, 30);
        staked_oracle(&mut network, 2, 40);

        let order: Vec<_> = network.registry().iter().map(|e| e.owner).collect();
        assert_eq!(order, vec![owner(2), owner(1)]);

        network
            .deposit(owner(1), Amount::from(20), owner(1), ctx(2))
            .expect("top up");
        let order: Vec<_> = network.registry().iter().map(|e| e.owner).collect();
        assert_eq!(order, vec![owner(1), owner(2)]);
        assert_eq!(
            network
                .get_oracle_registration_info(&owner(1))
                .expect("entry")
                .stake,
            Amount::from(50)
        );
        assert_eq!(network.get_oracle_owner(&reporter(1)), Some(owner(1)));
    }

    #[test]
    fn test_vested_rewards_count_toward_selection() {
        let mut network = network(&[(owner(1), 100), (owner(2), 100), (owner(9), 100)]);
        network
            .execute_change(
                governor(),
                ProtocolChange::SetMaxOraclesPerRound { pair: btc(), value: 1 },
                ctx(1),
            )
            .expect("cap");
        staked_oracle(&mut network, 1, 10);
        network.subscribe(owner(1), btc(), ctx(1)).expect("subscribe");

        // Vests over blocks 2..12 into the only holder's balance.
        network
            .distribute(owner(9), Amount::from(10), ctx(2))
            .expect("distribute");
        network
            .deposit(owner(2), Amount::from(12), owner(2), ctx(12))
            .expect("deposit");
        network
            .register_oracle(owner(2), reporter(2), "oracle-2.example".to_string(), ctx(12))
            .expect("register");
        network.subscribe(owner(2), btc(), ctx(12)).expect("subscribe");

        let outcome = network.switch_round(owner(9), btc(), ctx(13)).expect("switch");
        assert_eq!(outcome.selected, vec![(owner(1), reporter(1))]);
        let order: Vec<_> = network.registry().iter().map(|e| (e.owner, e.stake)).collect();
        assert_eq!(
            order,
            vec![(owner(1), Amount::from(20)), (owner(2), Amount::from(12))]
        );
    }

    #[test]
    fn test_lowering_subscription_cap_updates_registry() {
        let mut network = network(&[(owner(1), 100), (owner(2), 100), (owner(3), 100)]);
        for (n, stake) in [(1, 30), (2, 20), (3, 10)] {
            staked_oracle(&mut network, n, stake);
            network.subscribe(owner(n), btc(), ctx(1)).expect("subscribe");
        }
        network.take_events();

        network
            .execute_change(
                governor(),
                ProtocolChange::SetMaxSubscribedOracles { pair: btc(), value: 2 },
                ctx(2),
            )
            .expect("cap");
        assert!(!network.is_subscribed(&owner(3), &btc()).expect("pair"));
        assert!(!network
            .get_oracle_registration_info(&owner(3))
            .expect("entry")
            .is_subscribed(&btc()));
        let names: Vec<_> = network.take_events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["OracleUnsubscribed", "ProtocolChangeExecuted"]);
    }

    #[test]
    fn test_subscribe_records_events() {
        let mut network = network(&[(owner(1), 100)]);
        staked_oracle(&mut network, 1, 50);
        network.take_events();

        network.subscribe(owner(1), btc(), ctx(1)).expect("subscribe");
        let names: Vec<_> = network.take_events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["OracleSubscribed", "OracleJoinedRound"]);
        assert!(network.is_subscribed(&owner(1), &btc()).expect("pair"));
        assert!(network
            .get_oracle_registration_info(&owner(1))
            .expect("entry")
            .is_subscribed(&btc()));
    }

    #[test]
    fn test_failed_call_records_nothing() {
        let mut network = network(&[(owner(1), 100)]);
        staked_oracle(&mut network, 1, 5);
        network.take_events();

        assert!(matches!(
            network.subscribe(owner(1), btc(), ctx(1)),
            Err(ManagerError::NotEnoughStake { .. })
        ));
        assert!(network.take_events().is_empty());
    }

    #[test]
    fn test_withdraw_below_min_expels() {
        let mut network = network(&[(owner(1), 100)]);
        staked_oracle(&mut network, 1, 20);
        network.subscribe(owner(1), btc(), ctx(1)).expect("subscribe");
        network.take_events();

        network
            .withdraw(owner(1), Amount::from(15), ctx(2))
            .expect("withdraw");
        let names: Vec<_> = network.take_events().iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec!["StakeWithdrawn", "OracleUnsubscribed", "OracleLeftRound"]
        );
        assert!(!network.is_subscribed(&owner(1), &btc()).expect("pair"));
        assert!(network.get_round_info(&btc()).expect("pair").selected.is_empty());
        assert_eq!(network.pending_withdrawals(&owner(1)).len(), 1);
    }

    #[test]
    fn test_remove_oracle_requires_idle_rounds() {
        let mut network = network(&[(owner(1), 100)]);
        staked_oracle(&mut network, 1, 20);
        network.subscribe(owner(1), btc(), ctx(1)).expect("subscribe");

        assert!(!network.can_remove_oracle(&owner(1)));
        assert!(matches!(
            network.remove_oracle(owner(1)),
            Err(ManagerError::NotReadyToRemove { .. })
        ));

        network.unsubscribe(owner(1), btc()).expect("unsubscribe");
        network.switch_round(owner(9), btc(), ctx(2)).expect("switch");
        assert!(network.can_remove_oracle(&owner(1)));
        network.take_events();

        let entry = network.remove_oracle(owner(1)).expect("remove");
        assert_eq!(entry.address, reporter(1));
        assert!(!network.is_oracle_registered(&owner(1)));
        assert_eq!(network.get_balance(&owner(1), ctx(2)), Amount::from(20));
        let names: Vec<_> = network.take_events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["OracleRemoved"]);
    }

    #[test]
    fn test_governance_updates_staking_and_pairs() {
        let mut network = network(&[]);
        let locker = owner(7);
        network
            .execute_change(governor(), ProtocolChange::AddLocker { account: locker }, ctx(2))
            .expect("locker");
        network
            .execute_change(
                governor(),
                ProtocolChange::SetWithdrawLockTime { secs: 5 },
                ctx(2),
            )
            .expect("lock time");
        network
            .execute_change(
                governor(),
                ProtocolChange::SetMaxOraclesPerRound { pair: btc(), value: 4 },
                ctx(2),
            )
            .expect("max");
        assert_eq!(network.staking().withdraw_lock_time(), 5);
        assert_eq!(
            network.pair(&btc()).expect("pair").config().max_oracles_per_round,
            4
        );
        let events = network.take_events();
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .all(|e| e.name() == "ProtocolChangeExecuted"));
    }
}
