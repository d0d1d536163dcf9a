//! Diagnostics command handlers.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Daemon and network summary.
pub async fn get_status(state: &Arc<DaemonState>) -> Result {
    let status = state
        .network
        .call(|network, ctx| {
            let pairs: Vec<Value> = network
                .pairs()
                .map(|cpp| {
                    let round = cpp.round();
                    serde_json::json!({
                        "pair": cpp.pair(),
                        "round": round.number,
                        "members": round.members.len(),
                        "subscribed": cpp.subscribed().count(),
                        "last_publication_block": cpp.last_publication_block(),
                    })
                })
                .collect();
            Ok(serde_json::json!({
                "block": ctx.number,
                "timestamp": ctx.timestamp,
                "oracles": network.registry().len(),
                "pairs": pairs,
            }))
        })
        .await?;

    Ok(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "block_time_secs": state.clock.block_time_secs(),
        "genesis_timestamp": state.clock.genesis_timestamp(),
        "socket_path": state.config.socket_path(),
        "event_sequence": state.event_bus.sequence(),
        "network": status,
    }))
}

/// Ask the daemon to stop.
pub async fn shutdown(state: &Arc<DaemonState>) -> Result {
    info!("shutdown requested over RPC");
    let _ = state.shutdown_tx.send(());
    Ok(serde_json::json!({"stopping": true}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::state;

    #[tokio::test]
    async fn test_status_reports_pairs() {
        let state = state(&[]);
        let status = get_status(&state).await.expect("status");
        assert_eq!(status["network"]["oracles"], 0);
        assert_eq!(status["network"]["pairs"][0]["pair"], "BTCUSD");
        assert_eq!(status["network"]["pairs"][0]["round"], 1);
        assert_eq!(status["block_time_secs"], 30);
    }

    #[tokio::test]
    async fn test_shutdown_signals_listeners() {
        let state = state(&[]);
        let mut rx = state.shutdown_tx.subscribe();
        shutdown(&state).await.expect("shutdown");
        assert!(rx.try_recv().is_ok());
    }
}
