//! IPC command handlers.
//!
//! Each submodule implements the commands for one area of the network.
//! Every caller-attributed command takes the acting account as a
//! `caller` parameter. Handlers trust it; the RPC layer has already
//! checked the request signature against it.

pub mod diagnostics;
pub mod governance;
pub mod oracle;
pub mod price;
pub mod staking;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::rpc::RpcError;

/// Decode a handler's parameters.
pub(crate) fn parse<T: DeserializeOwned>(params: &Value) -> Result<T, RpcError> {
    serde_json::from_value(params.clone()).map_err(|e| RpcError::invalid_params(&e.to_string()))
}

/// Encode a handler's result.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&format!("encode error: {e}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use moc_manager::network::staking_account;
    use moc_round::RoundConfig;
    use moc_types::{Address, Amount, CoinPair};
    use tokio::sync::broadcast;

    use crate::auth::NonceTracker;
    use crate::clock::BlockClock;
    use crate::config::{DaemonConfig, GenesisBalance, PairConfig};
    use crate::events::EventBus;
    use crate::node;
    use crate::DaemonState;

    pub fn governor() -> Address {
        Address::from_low_u64_be(0xaa)
    }

    pub fn btc() -> CoinPair {
        CoinPair::from_name("BTCUSD").expect("pair")
    }

    /// A running daemon state with `accounts` funded with 1000 each and
    /// BTCUSD registered.
    pub fn state(accounts: &[Address]) -> Arc<DaemonState> {
        let mut config = DaemonConfig::default();
        config.network.governor = governor();
        config.network.min_subscription_stake = Amount::from(10);
        config.pairs.push(PairConfig {
            pair: btc(),
            round: RoundConfig {
                min_oracles_per_round: 1,
                max_oracles_per_round: 2,
                ..RoundConfig::default()
            },
        });
        for account in accounts {
            config.chain.genesis.push(GenesisBalance {
                account: *account,
                amount: Amount::from(1000),
            });
        }

        let clock = BlockClock::new(0, config.chain.block_time_secs);
        let mut network = node::bootstrap(&config, clock.now()).expect("bootstrap");
        for account in accounts {
            network
                .ledger_mut()
                .approve(*account, staking_account(), Amount::max_value());
        }
        let event_bus = EventBus::new(64);
        let (network, _task) = node::spawn(network, clock, event_bus.clone(), 16);
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(DaemonState {
            network,
            config,
            event_bus,
            clock,
            shutdown_tx,
            nonces: NonceTracker::new(),
        })
    }
}
