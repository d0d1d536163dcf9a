//! Share accounting and linear vesting.
//!
//! Holders own shares; the pool owns collateral. A holder's collateral
//! balance is `shares * available / total_shares`, rounded down, where
//! `available` is the settled collateral plus whatever the running
//! vesting schedule has released so far. Vesting is computed from the
//! schedule on every read, and folded into `collateral` on every write.
//!
//! Rounding always favours the pool. Dust stays in `collateral` and goes
//! to the last holder out. Collateral left behind when the last share is
//! burned is parked in `reserve` and re-enters through the next
//! distribution.

use std::collections::HashMap;

use moc_types::math::mul_div;
use moc_types::{Address, Amount};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Result, StakingError};

/// A share holder: an owner and one of its subaccounts.
///
/// Plain deposits use the owner as its own subaccount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StakeAccount {
    /// Account that controls the stake.
    pub owner: Address,
    /// Subaccount the stake is booked under.
    pub subaccount: Address,
}

impl StakeAccount {
    /// An explicit `(owner, subaccount)` holder.
    pub fn new(owner: Address, subaccount: Address) -> Self {
        Self { owner, subaccount }
    }

    /// The owner's own account.
    pub fn own(owner: Address) -> Self {
        Self::new(owner, owner)
    }
}

/// A linear release of `amount` over `[start, end)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingSchedule {
    /// Total reward being vested.
    pub amount: Amount,
    /// First block of the schedule.
    pub start: u64,
    /// Block at which the whole amount is released.
    pub end: u64,
    /// Part already folded into pool collateral.
    pub released: Amount,
}

impl VestingSchedule {
    /// Total released by block `now`.
    pub fn vested(&self, now: u64) -> Amount {
        if now >= self.end {
            return self.amount;
        }
        if now <= self.start {
            return Amount::zero();
        }
        mul_div(
            self.amount,
            Amount::from(now - self.start),
            Amount::from(self.end - self.start),
        )
        .unwrap_or(self.amount)
    }

    /// Released by `now` but not yet folded into collateral.
    pub fn unreleased(&self, now: u64) -> Amount {
        self.vested(now).saturating_sub(self.released)
    }

    /// Not yet folded into collateral.
    pub fn remaining(&self) -> Amount {
        self.amount.saturating_sub(self.released)
    }

    /// Whether the schedule is still releasing at `now`.
    pub fn is_active(&self, now: u64) -> bool {
        now < self.end
    }
}

/// The share pool.
#[derive(Debug)]
pub struct SharePool {
    shares: HashMap<StakeAccount, Amount>,
    total_shares: Amount,
    collateral: Amount,
    schedule: VestingSchedule,
    reserve: Amount,
    period: u64,
}

impl SharePool {
    /// Create an empty pool vesting rewards over `period` blocks.
    pub fn new(period: u64) -> Result<Self> {
        if period == 0 {
            return Err(StakingError::InvalidConfig(
                "vesting period must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            shares: HashMap::new(),
            total_shares: Amount::zero(),
            collateral: Amount::zero(),
            schedule: VestingSchedule::default(),
            reserve: Amount::zero(),
            period,
        })
    }

    /// Vesting period in blocks for the next distribution.
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Change the vesting period. A running schedule keeps its own end.
    pub fn set_period(&mut self, period: u64) -> Result<()> {
        if period == 0 {
            return Err(StakingError::InvalidConfig(
                "vesting period must be non-zero".to_string(),
            ));
        }
        self.period = period;
        Ok(())
    }

    /// Total shares outstanding.
    pub fn total_shares(&self) -> Amount {
        self.total_shares
    }

    /// Shares held by `account`.
    pub fn shares_of(&self, account: &StakeAccount) -> Amount {
        self.shares.get(account).copied().unwrap_or_default()
    }

    /// The current or last vesting schedule.
    pub fn schedule(&self) -> &VestingSchedule {
        &self.schedule
    }

    /// Collateral parked for the next distribution.
    pub fn reserve(&self) -> Amount {
        self.reserve
    }

    /// Collateral backing the shares at block `now`.
    pub fn available(&self, now: u64) -> Amount {
        self.collateral
            .saturating_add(self.schedule.unreleased(now))
    }

    /// Every unit of collateral the pool is accountable for, vested or not.
    /// Matches the pool's ledger balance.
    pub fn held(&self) -> Amount {
        self.collateral
            .saturating_add(self.schedule.remaining())
            .saturating_add(self.reserve)
    }

    /// Collateral balance of `account` at block `now`.
    pub fn balance_of(&self, account: &StakeAccount, now: u64) -> Amount {
        if self.total_shares.is_zero() {
            return Amount::zero();
        }
        mul_div(self.shares_of(account), self.available(now), self.total_shares)
            .unwrap_or_default()
    }

    /// Shares a deposit of `amount` would mint at block `now`.
    pub fn preview_deposit(&self, amount: Amount, now: u64) -> Result<Amount> {
        let available = self.available(now);
        if self.total_shares.is_zero() || available.is_zero() {
            return Ok(amount);
        }
        mul_div(amount, self.total_shares, available).ok_or(StakingError::Overflow)
    }

    /// Collateral burning `shares` of `account` would release at block `now`.
    pub fn preview_withdraw(&self, account: &StakeAccount, shares: Amount, now: u64) -> Result<Amount> {
        let held = self.shares_of(account);
        if shares > held {
            return Err(StakingError::InsufficientShares {
                needed: shares,
                available: held,
            });
        }
        if shares.is_zero() {
            return Ok(Amount::zero());
        }
        mul_div(shares, self.available(now), self.total_shares).ok_or(StakingError::Overflow)
    }

    /// Shares of `account` worth `amount` of collateral, rounded down and
    /// capped at the account's holding.
    pub fn shares_for_collateral(&self, account: &StakeAccount, amount: Amount, now: u64) -> Amount {
        let available = self.available(now);
        if self.total_shares.is_zero() || available.is_zero() {
            return Amount::zero();
        }
        let shares = mul_div(amount, self.total_shares, available).unwrap_or(Amount::MAX);
        shares.min(self.shares_of(account))
    }

    /// Book a deposit of `amount` for `account`. Returns the shares minted.
    ///
    /// A deposit that would mint no shares changes nothing and returns
    /// zero; the caller must not move the collateral in that case.
    pub fn deposit(&mut self, account: StakeAccount, amount: Amount, now: u64) -> Result<Amount> {
        if amount.is_zero() {
            return Ok(Amount::zero());
        }
        let minted = self.preview_deposit(amount, now)?;
        if minted.is_zero() {
            return Ok(Amount::zero());
        }
        let collateral = self
            .available(now)
            .checked_add(amount)
            .ok_or(StakingError::Overflow)?;
        let total_shares = self
            .total_shares
            .checked_add(minted)
            .ok_or(StakingError::Overflow)?;

        self.settle(now);
        if self.total_shares.is_zero() {
            self.park_residual();
            self.collateral = amount;
        } else {
            self.collateral = collateral;
        }
        self.total_shares = total_shares;
        *self.shares.entry(account).or_default() += minted;
        debug!(owner = ?account.owner, subaccount = ?account.subaccount, %amount, %minted, "shares minted");
        Ok(minted)
    }

    /// Burn `shares` of `account`. Returns the collateral released.
    pub fn withdraw_shares(&mut self, account: StakeAccount, shares: Amount, now: u64) -> Result<Amount> {
        let released = self.preview_withdraw(&account, shares, now)?;
        if shares.is_zero() {
            return Ok(Amount::zero());
        }
        self.settle(now);

        let held = self.shares_of(&account);
        if held == shares {
            self.shares.remove(&account);
        } else {
            self.shares.insert(account, held - shares);
        }
        self.total_shares -= shares;
        self.collateral = self.collateral.saturating_sub(released);
        if self.total_shares.is_zero() {
            self.park_residual();
        }
        debug!(owner = ?account.owner, subaccount = ?account.subaccount, %shares, %released, "shares burned");
        Ok(released)
    }

    /// Fail unless a distribution may start at block `now`.
    pub fn check_distribute(&self, now: u64) -> Result<()> {
        if self.total_shares.is_zero() || self.schedule.is_active(now) {
            return Err(StakingError::NotReadyToDistribute);
        }
        Ok(())
    }

    /// Start vesting `amount`, plus any parked reserve, over the period.
    pub fn distribute(&mut self, amount: Amount, now: u64) -> Result<VestingSchedule> {
        self.check_distribute(now)?;
        if amount.is_zero() {
            return Err(StakingError::ZeroAmount);
        }
        let earnings = amount
            .checked_add(self.reserve)
            .ok_or(StakingError::Overflow)?;
        let end = now.checked_add(self.period).ok_or(StakingError::Overflow)?;

        self.settle(now);
        self.reserve = Amount::zero();
        self.schedule = VestingSchedule {
            amount: earnings,
            start: now,
            end,
            released: Amount::zero(),
        };
        Ok(self.schedule)
    }

    fn settle(&mut self, now: u64) {
        let due = self.schedule.unreleased(now);
        if !due.is_zero() {
            self.collateral = self.collateral.saturating_add(due);
            self.schedule.released = self.schedule.released.saturating_add(due);
        }
    }

    fn park_residual(&mut self) {
        let residual = self.collateral.saturating_add(self.schedule.remaining());
        if !residual.is_zero() {
            debug!(%residual, "parking residual collateral");
        }
        self.reserve = self.reserve.saturating_add(residual);
        self.collateral = Amount::zero();
        self.schedule.released = self.schedule.amount;
        self.schedule.end = self.schedule.end.min(self.schedule.start);
    }
}
