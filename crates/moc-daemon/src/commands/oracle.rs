//! Oracle registry command handlers.

use std::sync::Arc;

use moc_types::{Address, CoinPair};
use serde::Deserialize;
use serde_json::Value;

use super::{parse, to_json};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

#[derive(Deserialize)]
struct RegisterParams {
    caller: Address,
    address: Address,
    name: String,
}

#[derive(Deserialize)]
struct NameParams {
    caller: Address,
    name: String,
}

#[derive(Deserialize)]
struct CallerParams {
    caller: Address,
}

#[derive(Deserialize)]
struct PairParams {
    caller: Address,
    pair: CoinPair,
}

#[derive(Deserialize)]
struct OwnerParams {
    owner: Address,
}

#[derive(Deserialize)]
struct AddressParams {
    address: Address,
}

#[derive(Deserialize)]
struct SubscriptionParams {
    owner: Address,
    pair: CoinPair,
}

/// Register the caller's oracle, staked with its current pool balance.
pub async fn register_oracle(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: RegisterParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            network.register_oracle(p.caller, p.address, p.name, ctx)?;
            let entry = network.get_oracle_registration_info(&p.caller);
            to_json(&entry)
        })
        .await
}

/// Change the caller's oracle name.
pub async fn set_oracle_name(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: NameParams = parse(params)?;
    state
        .network
        .call(move |network, _ctx| {
            network.set_oracle_name(p.caller, p.name)?;
            Ok(serde_json::json!({"updated": true}))
        })
        .await
}

/// Remove the caller's oracle.
pub async fn remove_oracle(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: CallerParams = parse(params)?;
    state
        .network
        .call(move |network, _ctx| {
            let entry = network.remove_oracle(p.caller)?;
            to_json(&entry)
        })
        .await
}

/// Subscribe the caller's oracle to a pair.
pub async fn subscribe(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: PairParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            network.subscribe(p.caller, p.pair, ctx)?;
            let info = network.get_oracle_round_info(&p.pair, &oracle_address(network, &p.caller))?;
            Ok(serde_json::json!({"subscribed": true, "selected": info.selected}))
        })
        .await
}

/// Unsubscribe the caller's oracle from a pair.
pub async fn unsubscribe(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: PairParams = parse(params)?;
    state
        .network
        .call(move |network, _ctx| {
            network.unsubscribe(p.caller, p.pair)?;
            Ok(serde_json::json!({"subscribed": false}))
        })
        .await
}

pub async fn get_oracle_registration_info(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: OwnerParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            network.refresh_stakes(ctx)?;
            to_json(&network.get_oracle_registration_info(&p.owner))
        })
        .await
}

pub async fn get_oracle_owner(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: AddressParams = parse(params)?;
    state
        .network
        .call(move |network, _ctx| to_json(&network.get_oracle_owner(&p.address)))
        .await
}

pub async fn is_subscribed(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: SubscriptionParams = parse(params)?;
    state
        .network
        .call(move |network, _ctx| Ok(serde_json::json!(network.is_subscribed(&p.owner, &p.pair)?)))
        .await
}

/// Whether the oracle has sat out enough rounds to be removed.
pub async fn can_remove_oracle(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: OwnerParams = parse(params)?;
    state
        .network
        .call(move |network, _ctx| {
            let registered = network.is_oracle_registered(&p.owner);
            Ok(serde_json::json!(registered && network.can_remove_oracle(&p.owner)))
        })
        .await
}

/// All registered oracles, highest stake first.
pub async fn list_oracles(state: &Arc<DaemonState>) -> Result {
    state
        .network
        .call(|network, ctx| {
            network.refresh_stakes(ctx)?;
            let entries: Vec<_> = network.registry().iter().collect();
            to_json(&entries)
        })
        .await
}

fn oracle_address(network: &moc_manager::OracleNetwork, owner: &Address) -> Address {
    network
        .get_oracle_registration_info(owner)
        .map(|entry| entry.address)
        .unwrap_or_default()
}
