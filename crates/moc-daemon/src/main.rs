//! moc-daemon: runs a price-oracle network and serves it over JSON-RPC.
//!
//! Single OS process running a Tokio async runtime. One writer task owns
//! the network state; operators, oracle nodes and price consumers talk to
//! it via JSON-RPC over a Unix socket.

mod auth;
mod clock;
mod commands;
mod config;
mod events;
mod node;
mod rpc;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::auth::NonceTracker;
use crate::clock::BlockClock;
use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::node::NetworkHandle;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Handle to the network writer task.
    pub network: NetworkHandle,
    /// Configuration.
    pub config: DaemonConfig,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
    /// Wall-clock to block mapping.
    pub clock: BlockClock,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
    /// Last accepted request nonce per caller.
    pub nonces: NonceTracker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("moc={}", config.daemon.log_level).parse()?),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "moc daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Build the network from genesis
    let clock = BlockClock::new(config.chain.genesis_timestamp, config.chain.block_time_secs);
    let network = node::bootstrap(&config, clock.now())?;
    info!(
        pairs = config.pairs.len(),
        genesis_accounts = config.chain.genesis.len(),
        block_time_secs = clock.block_time_secs(),
        "network initialized"
    );

    // 3. Create event bus and start the writer
    let event_bus = EventBus::new(1000);
    let (network, writer) = node::spawn(
        network,
        clock,
        event_bus.clone(),
        config.daemon.command_buffer,
    );

    // 4. Create shutdown channel
    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

    // 5. Build daemon state
    let socket_path = config.socket_path();
    let state = Arc::new(DaemonState {
        network,
        config,
        event_bus,
        clock,
        shutdown_tx: shutdown_tx.clone(),
        nonces: NonceTracker::new(),
    });

    // 6. Run the RPC server until shutdown
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Graceful shutdown
    info!("Daemon shutting down gracefully");
    writer.abort();

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}
