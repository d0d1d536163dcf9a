//! Delayed-withdrawal vault.
//!
//! Withdrawn collateral is parked with a beneficiary and an unlock time.
//! The beneficiary collects it once the unlock time has passed.

use std::collections::BTreeMap;

use moc_types::{Address, Amount};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ledger::CollateralLedger;
use crate::{Result, StakingError};

/// A parked payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedPayment {
    /// Account that parked the funds.
    pub source: Address,
    /// Account allowed to collect the funds.
    pub beneficiary: Address,
    /// Parked amount.
    pub amount: Amount,
    /// Earliest collection timestamp.
    pub unlock_time: u64,
}

/// Vault that holds withdrawals until they unlock.
pub trait DelayVault: Send {
    /// Ledger account holding parked funds.
    fn account(&self) -> Address;

    /// Move `amount` from `source` into the vault for `beneficiary`.
    /// Returns the payment id.
    fn deposit(
        &mut self,
        ledger: &mut dyn CollateralLedger,
        source: Address,
        beneficiary: Address,
        amount: Amount,
        unlock_time: u64,
    ) -> Result<u64>;

    /// Release payment `id` to its beneficiary.
    fn withdraw(
        &mut self,
        ledger: &mut dyn CollateralLedger,
        caller: Address,
        id: u64,
        now: u64,
    ) -> Result<DelayedPayment>;

    /// Payments waiting for `beneficiary`.
    fn pending(&self, beneficiary: &Address) -> Vec<(u64, DelayedPayment)>;
}

/// In-process delay vault.
#[derive(Debug)]
pub struct DelayMachine {
    account: Address,
    payments: BTreeMap<u64, DelayedPayment>,
    next_id: u64,
}

impl DelayMachine {
    /// Create a vault holding funds in ledger account `account`.
    pub fn new(account: Address) -> Self {
        Self {
            account,
            payments: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Look up a payment.
    pub fn get(&self, id: u64) -> Option<&DelayedPayment> {
        self.payments.get(&id)
    }
}

impl DelayVault for DelayMachine {
    fn account(&self) -> Address {
        self.account
    }

    fn deposit(
        &mut self,
        ledger: &mut dyn CollateralLedger,
        source: Address,
        beneficiary: Address,
        amount: Amount,
        unlock_time: u64,
    ) -> Result<u64> {
        if amount.is_zero() {
            return Err(StakingError::ZeroAmount);
        }
        if beneficiary.is_zero() {
            return Err(StakingError::ZeroAddress);
        }
        ledger.transfer(source, self.account, amount)?;
        let id = self.next_id;
        self.next_id += 1;
        self.payments.insert(
            id,
            DelayedPayment {
                source,
                beneficiary,
                amount,
                unlock_time,
            },
        );
        debug!(id, ?beneficiary, %amount, unlock_time, "delayed payment parked");
        Ok(id)
    }

    fn withdraw(
        &mut self,
        ledger: &mut dyn CollateralLedger,
        caller: Address,
        id: u64,
        now: u64,
    ) -> Result<DelayedPayment> {
        let payment = match self.payments.get(&id) {
            Some(p) if p.beneficiary == caller => p.clone(),
            _ => return Err(StakingError::InvalidId(id)),
        };
        if now < payment.unlock_time {
            return Err(StakingError::NotExpired {
                unlock_time: payment.unlock_time,
            });
        }
        ledger.transfer(self.account, payment.beneficiary, payment.amount)?;
        self.payments.remove(&id);
        info!(id, beneficiary = ?payment.beneficiary, amount = %payment.amount, "delayed payment released");
        Ok(payment)
    }

    fn pending(&self, beneficiary: &Address) -> Vec<(u64, DelayedPayment)> {
        self.payments
            .iter()
            .filter(|(_, p)| p.beneficiary == *beneficiary)
            .map(|(id, p)| (*id, p.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn setup() -> (InMemoryLedger, DelayMachine) {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(addr(1), Amount::from(100)).expect("mint");
        (ledger, DelayMachine::new(addr(50)))
    }

    #[test]
    fn test_withdraw_after_expiry() {
        let (mut ledger, mut vault) = setup();
        let id = vault
            .deposit(&mut ledger, addr(1), addr(2), Amount::from(30), 1_000)
            .expect("deposit");
        assert_eq!(ledger.balance_of(&addr(50)), Amount::from(30));
        assert_eq!(vault.pending(&addr(2)).len(), 1);

        assert!(matches!(
            vault.withdraw(&mut ledger, addr(2), id, 999),
            Err(StakingError::NotExpired { unlock_time: 1_000 })
        ));
        let paid = vault
            .withdraw(&mut ledger, addr(2), id, 1_000)
            .expect("withdraw");
        assert_eq!(paid.amount, Amount::from(30));
        assert_eq!(ledger.balance_of(&addr(2)), Amount::from(30));
        assert!(vault.pending(&addr(2)).is_empty());
    }

    #[test]
    fn test_only_beneficiary_withdraws() {
        let (mut ledger, mut vault) = setup();
        let id = vault
            .deposit(&mut ledger, addr(1), addr(2), Amount::from(30), 0)
            .expect("deposit");
        assert!(matches!(
            vault.withdraw(&mut ledger, addr(3), id, 10),
            Err(StakingError::InvalidId(_))
        ));
        assert!(matches!(
            vault.withdraw(&mut ledger, addr(2), id + 1, 10),
            Err(StakingError::InvalidId(_))
        ));
    }

    #[test]
    fn test_zero_deposit_rejected() {
        let (mut ledger, mut vault) = setup();
        assert!(matches!(
            vault.deposit(&mut ledger, addr(1), addr(2), Amount::zero(), 0),
            Err(StakingError::ZeroAmount)
        ));
    }
}
