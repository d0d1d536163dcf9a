//! Staking command handlers.

use std::sync::Arc;

use moc_types::{Address, Amount};
use serde::Deserialize;
use serde_json::Value;

use super::{parse, to_json};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

#[derive(Deserialize)]
struct AmountParams {
    caller: Address,
    amount: Amount,
}

#[derive(Deserialize)]
struct DepositParams {
    caller: Address,
    amount: Amount,
    /// Defaults to the caller.
    #[serde(default)]
    beneficiary: Option<Address>,
}

#[derive(Deserialize)]
struct SubaccountParams {
    caller: Address,
    amount: Amount,
    subaccount: Address,
}

#[derive(Deserialize)]
struct SharesParams {
    caller: Address,
    shares: Amount,
}

#[derive(Deserialize)]
struct LockParams {
    caller: Address,
    owner: Address,
    until: u64,
}

#[derive(Deserialize)]
struct DelayedParams {
    caller: Address,
    id: u64,
}

#[derive(Deserialize)]
struct BalanceParams {
    owner: Address,
    #[serde(default)]
    subaccount: Option<Address>,
}

#[derive(Deserialize)]
struct BeneficiaryParams {
    beneficiary: Address,
}

/// Allow the staking pool to pull up to `amount` of the caller's collateral.
pub async fn approve(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: AmountParams = parse(params)?;
    state
        .network
        .call(move |network, _ctx| {
            let spender = network.staking().account();
            network.ledger_mut().approve(p.caller, spender, p.amount);
            Ok(serde_json::json!({"spender": spender, "allowance": p.amount}))
        })
        .await
}

/// Deposit collateral into the pool.
pub async fn deposit(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: DepositParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            let beneficiary = p.beneficiary.unwrap_or(p.caller);
            let receipt = network.deposit(p.caller, p.amount, beneficiary, ctx)?;
            to_json(&receipt)
        })
        .await
}

/// Deposit collateral into one of the caller's subaccounts.
pub async fn stake_at(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: SubaccountParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            let receipt = network.stake_at(p.caller, p.amount, p.subaccount, ctx)?;
            to_json(&receipt)
        })
        .await
}

/// Withdraw collateral into the delay vault.
pub async fn withdraw(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: AmountParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            let receipt = network.withdraw(p.caller, p.amount, ctx)?;
            to_json(&receipt)
        })
        .await
}

pub async fn withdraw_from(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: SubaccountParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            let receipt = network.withdraw_from(p.caller, p.amount, p.subaccount, ctx)?;
            to_json(&receipt)
        })
        .await
}

pub async fn withdraw_shares(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: SharesParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            let receipt = network.withdraw_shares(p.caller, p.shares, ctx)?;
            to_json(&receipt)
        })
        .await
}

/// Start vesting a reward into the pool. Whitelisted callers only.
pub async fn distribute(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: AmountParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            let schedule = network.distribute(p.caller, p.amount, ctx)?;
            to_json(&schedule)
        })
        .await
}

pub async fn lock_stake(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: LockParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            let lock = network.lock_stake(p.caller, p.owner, p.until, ctx)?;
            to_json(&lock)
        })
        .await
}

/// Collect an unlocked delayed withdrawal.
pub async fn withdraw_delayed(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: DelayedParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            let payment = network.withdraw_delayed(p.caller, p.id, ctx)?;
            to_json(&payment)
        })
        .await
}

/// Pool balance, locked part and free collateral of an owner.
pub async fn get_balance(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: BalanceParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            let balance = match p.subaccount {
                Some(subaccount) => network.get_balance_at(&p.owner, &subaccount, ctx),
                None => network.get_balance(&p.owner, ctx),
            };
            Ok(serde_json::json!({
                "balance": balance,
                "shares": network.staking().get_shares(&p.owner),
                "locked": network.get_locked_balance(&p.owner, ctx),
                "collateral": network.ledger().balance_of(&p.owner),
            }))
        })
        .await
}

pub async fn pending_withdrawals(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: BeneficiaryParams = parse(params)?;
    state
        .network
        .call(move |network, _ctx| {
            let pending: Vec<Value> = network
                .pending_withdrawals(&p.beneficiary)
                .into_iter()
                .map(|(id, payment)| {
                    serde_json::json!({
                        "id": id,
                        "source": payment.source,
                        "amount": payment.amount,
                        "unlock_time": payment.unlock_time,
                    })
                })
                .collect();
            Ok(serde_json::json!(pending))
        })
        .await
}
