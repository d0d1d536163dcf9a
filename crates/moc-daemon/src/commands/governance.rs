//! Governance command handlers.

use std::sync::Arc;

use moc_manager::ProtocolChange;
use moc_types::{Address, CoinPair};
use serde::Deserialize;
use serde_json::Value;

use super::{parse, to_json};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

#[derive(Deserialize)]
struct ChangeParams {
    caller: Address,
    change: ProtocolChange,
}

#[derive(Deserialize)]
struct PairParams {
    pair: CoinPair,
}

/// Apply a protocol change on behalf of `caller`.
pub async fn execute_change(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: ChangeParams = parse(params)?;
    let name = p.change.name();
    state
        .network
        .call(move |network, ctx| {
            network.execute_change(p.caller, p.change, ctx)?;
            Ok(serde_json::json!({"executed": name}))
        })
        .await
}

/// Live parameters of a pair, whitelists included.
pub async fn get_pair_config(state: &Arc<DaemonState>, params: &Value) -> Result {
    let p: PairParams = parse(params)?;
    state
        .network
        .call(move |network, _ctx| {
            let cpp = network.pair(&p.pair)?;
            let mut config = to_json(cpp.config())?;
            config["read_whitelist"] = to_json(&cpp.read_whitelist().collect::<Vec<_>>())?;
            config["emergency_whitelist"] =
                to_json(&cpp.emergency_whitelist().collect::<Vec<_>>())?;
            config["subscribed"] = to_json(&cpp.subscribed().collect::<Vec<_>>())?;
            Ok(config)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{governor, state};

    #[tokio::test]
    async fn test_execute_change_updates_pair() {
        let state = state(&[]);
        let reply = execute_change(
            &state,
            &serde_json::json!({
                "caller": governor(),
                "change": {"change": "set_max_oracles_per_round", "pair": "BTCUSD", "value": 7},
            }),
        )
        .await
        .expect("change");
        assert_eq!(reply["executed"], "set_max_oracles_per_round");

        let config = get_pair_config(&state, &serde_json::json!({"pair": "BTCUSD"}))
            .await
            .expect("config");
        assert_eq!(config["max_oracles_per_round"], 7);
        assert_eq!(config["read_whitelist"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_register_pair_through_rpc() {
        let state = state(&[]);
        execute_change(
            &state,
            &serde_json::json!({
                "caller": governor(),
                "change": {"change": "register_pair", "pair": "RIFBTC", "config": {}},
            }),
        )
        .await
        .expect("register");
        assert!(get_pair_config(&state, &serde_json::json!({"pair": "RIFBTC"}))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_non_governor_rejected() {
        let state = state(&[]);
        let err = execute_change(
            &state,
            &serde_json::json!({
                "caller": Address::from_low_u64_be(1),
                "change": {"change": "set_num_idle_rounds", "rounds": 4},
            }),
        )
        .await
        .expect_err("not governor");
        assert_eq!(err.code, -32020);

        let err = execute_change(
            &state,
            &serde_json::json!({"caller": governor(), "change": {"change": "self_destruct"}}),
        )
        .await
        .expect_err("unknown change");
        assert_eq!(err.code, -32602);
    }
}
