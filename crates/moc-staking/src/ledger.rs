//! Collateral token ledger.
//!
//! The staking pool, the delay vault and the per-pair fee accounts all
//! hold collateral on one ledger. The core only calls this interface.

use std::collections::HashMap;

use moc_types::{Address, Amount};
use tracing::debug;

use crate::{Result, StakingError};

/// Token ledger supporting transfer, approve and mint.
pub trait CollateralLedger: Send {
    /// Balance held by `account`.
    fn balance_of(&self, account: &Address) -> Amount;

    /// Move `amount` from `from` to `to`.
    fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> Result<()>;

    /// Allow `spender` to move up to `amount` of `owner`'s balance.
    fn approve(&mut self, owner: Address, spender: Address, amount: Amount);

    /// Remaining amount `spender` may move on behalf of `owner`.
    fn allowance(&self, owner: &Address, spender: &Address) -> Amount;

    /// Move `amount` from `from` to `to` against `spender`'s allowance.
    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<()>;

    /// Create `amount` new tokens for `to`.
    fn mint(&mut self, to: Address, amount: Amount) -> Result<()>;
}

/// Ledger kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    total_supply: Amount,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total minted supply.
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }
}

impl CollateralLedger for InMemoryLedger {
    fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> Result<()> {
        let available = self.balance_of(&from);
        if available < amount {
            return Err(StakingError::InsufficientBalance {
                account: from,
                needed: amount,
                available,
            });
        }
        let credited = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(StakingError::Overflow)?;
        if from != to {
            self.balances.insert(from, available - amount);
            self.balances.insert(to, credited);
        }
        debug!(?from, ?to, %amount, "ledger transfer");
        Ok(())
    }

    fn approve(&mut self, owner: Address, spender: Address, amount: Amount) {
        self.allowances.insert((owner, spender), amount);
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or_default()
    }

    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<()> {
        let allowed = self.allowance(&from, &spender);
        if allowed < amount {
            return Err(StakingError::InsufficientAllowance {
                needed: amount,
                available: allowed,
            });
        }
        self.transfer(from, to, amount)?;
        self.allowances.insert((from, spender), allowed - amount);
        Ok(())
    }

    fn mint(&mut self, to: Address, amount: Amount) -> Result<()> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(StakingError::Overflow)?;
        let balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(StakingError::Overflow)?;
        self.total_supply = supply;
        self.balances.insert(to, balance);
        Ok(())
    }
}
