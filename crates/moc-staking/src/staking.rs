//! Staking facade.
//!
//! Wraps the share pool with the collateral ledger and the delay vault.
//! Collateral enters from the depositor's ledger balance against an
//! allowance granted to the pool account, and leaves through the vault.

use std::collections::{BTreeSet, HashMap};

use moc_types::{Address, Amount, BlockContext};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::delay::{DelayVault, DelayedPayment};
use crate::ledger::CollateralLedger;
use crate::pool::{SharePool, StakeAccount, VestingSchedule};
use crate::{Result, StakingError};

/// Default vesting period for distributed rewards, in blocks.
pub const DEFAULT_VESTING_PERIOD_BLOCKS: u64 = 10;

/// Default delay before withdrawn collateral can be collected, in seconds.
pub const DEFAULT_WITHDRAW_LOCK_TIME_SECS: u64 = 3600;

/// Staking parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Blocks over which a distribution vests.
    #[serde(default = "default_vesting_period")]
    pub vesting_period_blocks: u64,
    /// Seconds a withdrawal stays in the delay vault.
    #[serde(default = "default_withdraw_lock_time")]
    pub withdraw_lock_time_secs: u64,
    /// Callers allowed to act on subaccounts other than themselves.
    #[serde(default)]
    pub whitelist: Vec<Address>,
    /// Callers allowed to lock stake.
    #[serde(default)]
    pub lockers: Vec<Address>,
}

fn default_vesting_period() -> u64 {
    DEFAULT_VESTING_PERIOD_BLOCKS
}

fn default_withdraw_lock_time() -> u64 {
    DEFAULT_WITHDRAW_LOCK_TIME_SECS
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            vesting_period_blocks: default_vesting_period(),
            withdraw_lock_time_secs: default_withdraw_lock_time(),
            whitelist: Vec::new(),
            lockers: Vec::new(),
        }
    }
}

/// Outcome of a deposit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    /// Credited holder.
    pub account: StakeAccount,
    /// Collateral moved into the pool. Zero when nothing was minted.
    pub amount: Amount,
    /// Shares minted.
    pub shares: Amount,
}

/// Outcome of a withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawReceipt {
    /// Debited holder.
    pub account: StakeAccount,
    /// Collateral sent to the delay vault.
    pub amount: Amount,
    /// Shares burned.
    pub shares: Amount,
    /// Vault payment id, absent when nothing was released.
    pub delay_id: Option<u64>,
}

/// Stake an owner may not withdraw before `until`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeLock {
    /// Locked collateral.
    pub amount: Amount,
    /// Lock expiry timestamp.
    pub until: u64,
}

/// The staking component.
pub struct Staking {
    account: Address,
    pool: SharePool,
    ledger: Box<dyn CollateralLedger>,
    vault: Box<dyn DelayVault>,
    withdraw_lock_time: u64,
    whitelist: BTreeSet<Address>,
    lockers: BTreeSet<Address>,
    locks: HashMap<Address, StakeLock>,
}

impl Staking {
    /// Create the staking component. `account` is the pool's ledger account.
    pub fn new(
        account: Address,
        config: &StakingConfig,
        ledger: Box<dyn CollateralLedger>,
        vault: Box<dyn DelayVault>,
    ) -> Result<Self> {
        if account.is_zero() {
            return Err(StakingError::ZeroAddress);
        }
        Ok(Self {
            account,
            pool: SharePool::new(config.vesting_period_blocks)?,
            ledger,
            vault,
            withdraw_lock_time: config.withdraw_lock_time_secs,
            whitelist: config.whitelist.iter().copied().collect(),
            lockers: config.lockers.iter().copied().collect(),
            locks: HashMap::new(),
        })
    }

    /// The pool's ledger account. Depositors approve this account.
    pub fn account(&self) -> Address {
        self.account
    }

    /// The share pool.
    pub fn pool(&self) -> &SharePool {
        &self.pool
    }

    /// The collateral ledger.
    pub fn ledger(&self) -> &dyn CollateralLedger {
        self.ledger.as_ref()
    }

    /// The collateral ledger, for payouts made by other components.
    pub fn ledger_mut(&mut self) -> &mut dyn CollateralLedger {
        self.ledger.as_mut()
    }

    /// Deposit `amount` from `caller` for `beneficiary`.
    pub fn deposit(
        &mut self,
        caller: Address,
        amount: Amount,
        beneficiary: Address,
        ctx: BlockContext,
    ) -> Result<DepositReceipt> {
        if beneficiary.is_zero() {
            return Err(StakingError::ZeroAddress);
        }
        self.book_deposit(caller, StakeAccount::own(beneficiary), amount, ctx)
    }

    /// Deposit `amount` from `caller` into its `subaccount`.
    pub fn stake_at(
        &mut self,
        caller: Address,
        amount: Amount,
        subaccount: Address,
        ctx: BlockContext,
    ) -> Result<DepositReceipt> {
        self.check_subaccount(caller, subaccount)?;
        self.book_deposit(caller, StakeAccount::new(caller, subaccount), amount, ctx)
    }

    /// Withdraw up to `amount` of collateral from `caller`'s own account.
    pub fn withdraw(
        &mut self,
        caller: Address,
        amount: Amount,
        ctx: BlockContext,
    ) -> Result<WithdrawReceipt> {
        let account = StakeAccount::own(caller);
        let shares = self.pool.shares_for_collateral(&account, amount, ctx.number);
        self.release(account, shares, ctx)
    }

    /// Withdraw up to `amount` of collateral from `caller`'s `subaccount`.
    pub fn withdraw_from(
        &mut self,
        caller: Address,
        amount: Amount,
        subaccount: Address,
        ctx: BlockContext,
    ) -> Result<WithdrawReceipt> {
        self.check_subaccount(caller, subaccount)?;
        let account = StakeAccount::new(caller, subaccount);
        let shares = self.pool.shares_for_collateral(&account, amount, ctx.number);
        self.release(account, shares, ctx)
    }

    /// Burn exactly `shares` of `caller`'s own account.
    pub fn withdraw_shares(
        &mut self,
        caller: Address,
        shares: Amount,
        ctx: BlockContext,
    ) -> Result<WithdrawReceipt> {
        self.release(StakeAccount::own(caller), shares, ctx)
    }

    /// Start vesting `amount` taken from `caller` as a reward.
    pub fn distribute(
        &mut self,
        caller: Address,
        amount: Amount,
        ctx: BlockContext,
    ) -> Result<VestingSchedule> {
        self.pool.check_distribute(ctx.number)?;
        if amount.is_zero() {
            return Err(StakingError::ZeroAmount);
        }
        self.ledger
            .transfer_from(self.account, caller, self.account, amount)?;
        let schedule = self.pool.distribute(amount, ctx.number)?;
        info!(earnings = %schedule.amount, start = schedule.start, end = schedule.end, "pay earnings");
        Ok(schedule)
    }

    /// Collateral balance of `owner`'s own account.
    pub fn get_balance(&self, owner: &Address, ctx: BlockContext) -> Amount {
        self.pool.balance_of(&StakeAccount::own(*owner), ctx.number)
    }

    /// Collateral balance of `owner`'s `subaccount`.
    pub fn get_balance_at(&self, owner: &Address, subaccount: &Address, ctx: BlockContext) -> Amount {
        self.pool
            .balance_of(&StakeAccount::new(*owner, *subaccount), ctx.number)
    }

    /// Shares of `owner`'s own account.
    pub fn get_shares(&self, owner: &Address) -> Amount {
        self.pool.shares_of(&StakeAccount::own(*owner))
    }

    /// Collateral currently locked for `owner`.
    pub fn get_locked_balance(&self, owner: &Address, ctx: BlockContext) -> Amount {
        match self.locks.get(owner) {
            Some(lock) if ctx.timestamp < lock.until => lock.amount,
            _ => Amount::zero(),
        }
    }

    /// Lock `owner`'s current balance until `until`.
    pub fn lock_stake(
        &mut self,
        caller: Address,
        owner: Address,
        until: u64,
        ctx: BlockContext,
    ) -> Result<StakeLock> {
        if !self.lockers.contains(&caller) {
            return Err(StakingError::NotWhitelisted(caller));
        }
        let lock = StakeLock {
            amount: self.get_balance(&owner, ctx),
            until,
        };
        self.locks.insert(owner, lock);
        info!(?owner, amount = %lock.amount, until, "stake locked");
        Ok(lock)
    }

    /// Collect a delayed payment.
    pub fn withdraw_delayed(
        &mut self,
        caller: Address,
        id: u64,
        ctx: BlockContext,
    ) -> Result<DelayedPayment> {
        self.vault
            .withdraw(self.ledger.as_mut(), caller, id, ctx.timestamp)
    }

    /// Payments waiting in the vault for `beneficiary`.
    pub fn pending_withdrawals(&self, beneficiary: &Address) -> Vec<(u64, DelayedPayment)> {
        self.vault.pending(beneficiary)
    }

    /// Seconds a withdrawal stays in the vault.
    pub fn withdraw_lock_time(&self) -> u64 {
        self.withdraw_lock_time
    }

    /// Set the vault delay for later withdrawals.
    pub fn set_withdraw_lock_time(&mut self, secs: u64) {
        self.withdraw_lock_time = secs;
    }

    /// Set the vesting period for later distributions.
    pub fn set_vesting_period(&mut self, blocks: u64) -> Result<()> {
        self.pool.set_period(blocks)
    }

    /// Whether `account` may act on other subaccounts.
    pub fn is_whitelisted(&self, account: &Address) -> bool {
        self.whitelist.contains(account)
    }

    /// Allow `account` to act on other subaccounts.
    pub fn add_to_whitelist(&mut self, account: Address) -> Result<()> {
        insert_unique(&mut self.whitelist, account)
    }

    /// Revoke a whitelist entry.
    pub fn remove_from_whitelist(&mut self, account: Address) -> Result<()> {
        if !self.whitelist.remove(&account) {
            return Err(StakingError::NotWhitelisted(account));
        }
        Ok(())
    }

    /// Allow `account` to lock stake.
    pub fn add_locker(&mut self, account: Address) -> Result<()> {
        insert_unique(&mut self.lockers, account)
    }

    /// Revoke a locker.
    pub fn remove_locker(&mut self, account: Address) -> Result<()> {
        if !self.lockers.remove(&account) {
            return Err(StakingError::NotWhitelisted(account));
        }
        Ok(())
    }

    fn check_subaccount(&self, caller: Address, subaccount: Address) -> Result<()> {
        if subaccount.is_zero() {
            return Err(StakingError::ZeroAddress);
        }
        if subaccount != caller && !self.whitelist.contains(&caller) {
            return Err(StakingError::NotWhitelisted(caller));
        }
        Ok(())
    }

    fn book_deposit(
        &mut self,
        caller: Address,
        account: StakeAccount,
        amount: Amount,
        ctx: BlockContext,
    ) -> Result<DepositReceipt> {
        let shares = if amount.is_zero() {
            Amount::zero()
        } else {
            self.pool.preview_deposit(amount, ctx.number)?
        };
        if shares.is_zero() {
            return Ok(DepositReceipt {
                account,
                amount: Amount::zero(),
                shares,
            });
        }

        self.ledger
            .transfer_from(self.account, caller, self.account, amount)?;
        let shares = self.pool.deposit(account, amount, ctx.number)?;
        Ok(DepositReceipt {
            account,
            amount,
            shares,
        })
    }

    fn release(
        &mut self,
        account: StakeAccount,
        shares: Amount,
        ctx: BlockContext,
    ) -> Result<WithdrawReceipt> {
        let amount = self.pool.preview_withdraw(&account, shares, ctx.number)?;
        if amount.is_zero() {
            return Ok(WithdrawReceipt {
                account,
                amount,
                shares: Amount::zero(),
                delay_id: None,
            });
        }

        if account.owner == account.subaccount {
            let locked = self.get_locked_balance(&account.owner, ctx);
            let remaining = self
                .get_balance(&account.owner, ctx)
                .saturating_sub(amount);
            if remaining < locked {
                let until = self.locks.get(&account.owner).map(|l| l.until).unwrap_or_default();
                warn!(owner = ?account.owner, %locked, until, "withdrawal blocked by stake lock");
                return Err(StakingError::StakeLocked { locked, until });
            }
        }

        let unlock_time = ctx
            .timestamp
            .checked_add(self.withdraw_lock_time)
            .ok_or(StakingError::Overflow)?;
        let delay_id = self.vault.deposit(
            self.ledger.as_mut(),
            self.account,
            account.owner,
            amount,
            unlock_time,
        )?;
        let released = self.pool.withdraw_shares(account, shares, ctx.number)?;
        info!(owner = ?account.owner, subaccount = ?account.subaccount, %released, delay_id, "stake withdrawn");
        Ok(WithdrawReceipt {
            account,
            amount: released,
            shares,
            delay_id: Some(delay_id),
        })
    }
}

impl std::fmt::Debug for Staking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Staking")
            .field("account", &self.account)
            .field("pool", &self.pool)
            .field("withdraw_lock_time", &self.withdraw_lock_time)
            .finish()
    }
}

fn insert_unique(set: &mut BTreeSet<Address>, account: Address) -> Result<()> {
    if account.is_zero() {
        return Err(StakingError::ZeroAddress);
    }
    if !set.insert(account) {
        return Err(StakingError::AlreadyWhitelisted(account));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::DelayMachine;
    use crate::ledger::InMemoryLedger;

    const POOL: u64 = 0xfeed;
    const VAULT: u64 = 0xde1a;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn amt(n: u64) -> Amount {
        Amount::from(n)
    }

    fn ctx(block: u64) -> BlockContext {
        BlockContext::new(block, 1_000 + block * 10)
    }

    fn staking_with(config: StakingConfig, funded: &[u64]) -> Staking {
        let mut ledger = InMemoryLedger::new();
        for n in funded {
            ledger.mint(addr(*n), amt(1_000)).expect("mint");
            ledger.approve(addr(*n), addr(POOL), Amount::MAX);
        }
        Staking::new(
            addr(POOL),
            &config,
            Box::new(ledger),
            Box::new(DelayMachine::new(addr(VAULT))),
        )
        .expect("staking")
    }

    #[test]
    fn test_deposit_pulls_collateral() {
        let mut staking = staking_with(StakingConfig::default(), &[1]);
        let receipt = staking
            .deposit(addr(1), amt(100), addr(1), ctx(0))
            .expect("deposit");
        assert_eq!(receipt.shares, amt(100));
        assert_eq!(staking.ledger().balance_of(&addr(1)), amt(900));
        assert_eq!(staking.ledger().balance_of(&addr(POOL)), amt(100));
        assert_eq!(staking.get_balance(&addr(1), ctx(0)), amt(100));
    }

    #[test]
    fn test_deposit_requires_allowance() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(addr(1), amt(10)).expect("mint");
        let mut staking = Staking::new(
            addr(POOL),
            &StakingConfig::default(),
            Box::new(ledger),
            Box::new(DelayMachine::new(addr(VAULT))),
        )
        .expect("staking");
        assert!(matches!(
            staking.deposit(addr(1), amt(5), addr(1), ctx(0)),
            Err(StakingError::InsufficientAllowance { .. })
        ));
        assert_eq!(staking.pool().total_shares(), Amount::zero());
    }

    #[test]
    fn test_withdraw_goes_through_vault() {
        let mut staking = staking_with(StakingConfig::default(), &[1]);
        staking
            .deposit(addr(1), amt(100), addr(1), ctx(0))
            .expect("deposit");
        let receipt = staking.withdraw(addr(1), amt(40), ctx(1)).expect("withdraw");
        assert_eq!(receipt.amount, amt(40));
        let id = receipt.delay_id.expect("vault id");

        assert_eq!(staking.ledger().balance_of(&addr(VAULT)), amt(40));
        assert!(matches!(
            staking.withdraw_delayed(addr(1), id, ctx(1)),
            Err(StakingError::NotExpired { .. })
        ));
        let later = BlockContext::new(2, ctx(1).timestamp + DEFAULT_WITHDRAW_LOCK_TIME_SECS);
        staking
            .withdraw_delayed(addr(1), id, later)
            .expect("collect");
        assert_eq!(staking.ledger().balance_of(&addr(1)), amt(940));
        assert!(staking.pending_withdrawals(&addr(1)).is_empty());
    }

    #[test]
    fn test_zero_share_deposit_moves_nothing() {
        let mut staking = staking_with(StakingConfig::default(), &[1, 2]);
        staking.deposit(addr(1), amt(1), addr(1), ctx(0)).expect("deposit");
        staking.distribute(addr(2), amt(1), ctx(0)).expect("distribute");

        let receipt = staking
            .deposit(addr(2), amt(1), addr(2), ctx(10))
            .expect("deposit");
        assert_eq!(receipt.shares, Amount::zero());
        assert_eq!(receipt.amount, Amount::zero());
        assert_eq!(staking.ledger().balance_of(&addr(2)), amt(999));
        assert_eq!(staking.get_balance(&addr(2), ctx(10)), Amount::zero());
    }

    #[test]
    fn test_withdraw_rounding_yields_nothing() {
        let mut staking = staking_with(StakingConfig::default(), &[1, 2]);
        staking.deposit(addr(1), amt(1), addr(1), ctx(0)).expect("deposit");
        staking.distribute(addr(2), amt(1), ctx(0)).expect("distribute");

        let receipt = staking.withdraw(addr(1), amt(1), ctx(10)).expect("withdraw");
        assert_eq!(receipt.amount, Amount::zero());
        assert_eq!(receipt.delay_id, None);

        let receipt = staking.withdraw(addr(1), amt(2), ctx(10)).expect("withdraw");
        assert_eq!(receipt.amount, amt(2));
    }

    #[test]
    fn test_subaccounts_need_whitelist() {
        let config = StakingConfig {
            whitelist: vec![addr(7)],
            ..StakingConfig::default()
        };
        let mut staking = staking_with(config, &[1, 7]);
        assert!(matches!(
            staking.stake_at(addr(1), amt(10), addr(2), ctx(0)),
            Err(StakingError::NotWhitelisted(_))
        ));
        staking
            .stake_at(addr(1), amt(10), addr(1), ctx(0))
            .expect("own subaccount");
        staking
            .stake_at(addr(7), amt(10), addr(2), ctx(0))
            .expect("whitelisted");
        assert_eq!(staking.get_balance_at(&addr(7), &addr(2), ctx(0)), amt(10));
        assert_eq!(staking.get_balance(&addr(7), ctx(0)), Amount::zero());

        let receipt = staking
            .withdraw_from(addr(7), amt(4), addr(2), ctx(1))
            .expect("withdraw from subaccount");
        assert_eq!(receipt.amount, amt(4));
        assert_eq!(staking.pending_withdrawals(&addr(7)).len(), 1);
    }

    #[test]
    fn test_whitelist_management() {
        let mut staking = staking_with(StakingConfig::default(), &[]);
        assert!(matches!(
            staking.add_to_whitelist(Address::zero()),
            Err(StakingError::ZeroAddress)
        ));
        staking.add_to_whitelist(addr(3)).expect("add");
        assert!(matches!(
            staking.add_to_whitelist(addr(3)),
            Err(StakingError::AlreadyWhitelisted(_))
        ));
        staking.remove_from_whitelist(addr(3)).expect("remove");
        assert!(!staking.is_whitelisted(&addr(3)));
    }

    #[test]
    fn test_stake_lock_blocks_withdrawal() {
        let config = StakingConfig {
            lockers: vec![addr(9)],
            ..StakingConfig::default()
        };
        let mut staking = staking_with(config, &[1]);
        staking
            .deposit(addr(1), amt(100), addr(1), ctx(0))
            .expect("deposit");

        assert!(matches!(
            staking.lock_stake(addr(1), addr(1), 5_000, ctx(0)),
            Err(StakingError::NotWhitelisted(_))
        ));
        staking
            .lock_stake(addr(9), addr(1), 5_000, ctx(0))
            .expect("lock");
        staking
            .deposit(addr(1), amt(50), addr(1), ctx(1))
            .expect("deposit more");

        // Only the unlocked surplus can leave.
        staking.withdraw(addr(1), amt(50), ctx(2)).expect("surplus");
        assert!(matches!(
            staking.withdraw(addr(1), amt(1), ctx(2)),
            Err(StakingError::StakeLocked { .. })
        ));
        let after = BlockContext::new(3, 5_000);
        staking.withdraw(addr(1), amt(1), after).expect("lock expired");
    }

    #[test]
    fn test_distribute_pulls_reward() {
        let mut staking = staking_with(StakingConfig::default(), &[1, 2]);
        assert!(matches!(
            staking.distribute(addr(2), amt(5), ctx(0)),
            Err(StakingError::NotReadyToDistribute)
        ));
        staking.deposit(addr(1), amt(10), addr(1), ctx(0)).expect("deposit");
        let schedule = staking.distribute(addr(2), amt(5), ctx(0)).expect("distribute");
        assert_eq!(schedule.end, DEFAULT_VESTING_PERIOD_BLOCKS);
        assert_eq!(staking.ledger().balance_of(&addr(POOL)), amt(15));
        assert_eq!(staking.get_balance(&addr(1), ctx(10)), amt(15));
        assert_eq!(staking.pool().held(), amt(15));
    }
}
