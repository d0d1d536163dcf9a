//! Price publication and round command handlers.

use std::sync::Arc;

use moc_crypto::{PriceMessage, Signature};
use moc_types::{Address, Amount, CoinPair};
use serde::Deserialize;
use serde_json::Value;

use super::{parse, to_json};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

#[derive(Deserialize)]
struct PublishParams {
    caller: Address,
    message: PriceMessage,
    signatures: Vec<Signature>,
}

#[derive(Deserialize)]
struct EmergencyParams {
    caller: Address,
    pair: CoinPair,
    price: Amount,
}

#[derive(Deserialize)]
struct PairCallParams {
    caller: Address,
    pair: CoinPair,
}

#[derive(Deserialize)]
struct PairParams {
    pair: CoinPair,
}

#[derive(Deserialize)]
struct OracleRoundParams {
    pair: CoinPair,
    address: Address,
}

#[derive(Deserialize)]
struct MessageParams {
    message: PriceMessage,
}

/// Submit a quorum-certified price.
pub async fn publish_price(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: PublishParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            let outcome = network.publish_price(p.caller, &p.message, &p.signatures, ctx)?;
            let mut reply = to_json(&outcome)?;
            reply["block"] = serde_json::json!(ctx.number);
            Ok(reply)
        })
        .await
}

/// Publish without a quorum. Emergency whitelist only.
pub async fn emergency_publish(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: EmergencyParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            network.emergency_publish(p.caller, p.pair, p.price, ctx)?;
            Ok(serde_json::json!({"published": true, "block": ctx.number}))
        })
        .await
}

/// Pay the running round and select the next one.
pub async fn switch_round(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: PairCallParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            let outcome = network.switch_round(p.caller, p.pair, ctx)?;
            to_json(&outcome)
        })
        .await
}

/// Current price and whether it is still valid. Read whitelist only.
pub async fn peek(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: PairCallParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            let (price, valid) = network.peek(&p.caller, &p.pair, ctx)?;
            Ok(serde_json::json!({"price": price, "valid": valid}))
        })
        .await
}

/// Current valid price. Read whitelist only.
pub async fn get_price(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: PairCallParams = parse(params)?;
    state
        .network
        .call(move |network, ctx| {
            let price = network.get_price(&p.caller, &p.pair, ctx)?;
            to_json(&price)
        })
        .await
}

/// Running round of a pair, with the publication block co-signers must
/// quote and the fees it will pay out.
pub async fn get_round_info(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: PairParams = parse(params)?;
    state
        .network
        .call(move |network, _ctx| {
            let cpp = network.pair(&p.pair)?;
            let mut info = to_json(&cpp.round_info())?;
            info["last_publication_block"] = serde_json::json!(cpp.last_publication_block());
            info["available_reward_fees"] = to_json(&network.available_reward_fees(&p.pair)?)?;
            info["fee_account"] = to_json(&cpp.fee_account())?;
            Ok(info)
        })
        .await
}

pub async fn get_oracle_round_info(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: OracleRoundParams = parse(params)?;
    state
        .network
        .call(move |network, _ctx| {
            let info = network.get_oracle_round_info(&p.pair, &p.address)?;
            to_json(&info)
        })
        .await
}

/// Canonical encoding and signing hash of a price message, for oracle
/// nodes that sign out of process.
pub async fn encode_price_message(params: &Value) -> Result {
    let p: MessageParams = parse(params)?;
    Ok(serde_json::json!({
        "encoded": format!("0x{}", hex::encode(p.message.encode())),
        "signing_hash": p.message.signing_hash(),
    }))
}
