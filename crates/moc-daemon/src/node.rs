//! The network writer.
//!
//! One task owns the `OracleNetwork`. RPC handlers send it jobs over a
//! bounded channel and await the reply on a oneshot, so every mutation
//! runs alone, in arrival order, against the block context current when
//! the writer picks it up.

use moc_manager::{OracleNetwork, ProtocolChange};
use moc_staking::{CollateralLedger, InMemoryLedger};
use moc_types::BlockContext;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::BlockClock;
use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::rpc::RpcError;

/// Outcome of a job, as sent back to the RPC caller.
pub type Reply = std::result::Result<Value, RpcError>;

type Job = Box<dyn FnOnce(&mut OracleNetwork, BlockContext) -> Reply + Send>;

struct Command {
    job: Job,
    reply: oneshot::Sender<Reply>,
}

/// Cloneable handle to the writer task.
#[derive(Clone)]
pub struct NetworkHandle {
    tx: mpsc::Sender<Command>,
}

impl NetworkHandle {
    /// Run `job` on the writer and wait for its reply.
    pub async fn call<F>(&self, job: F) -> Reply
    where
        F: FnOnce(&mut OracleNetwork, BlockContext) -> Reply + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command {
                job: Box::new(job),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RpcError::internal_error("network writer stopped"))?;
        reply_rx
            .await
            .map_err(|_| RpcError::internal_error("network writer dropped the request"))?
    }
}

/// Build the network described by `config`: genesis balances, then the
/// configured pairs, registered through the governor.
pub fn bootstrap(config: &DaemonConfig, ctx: BlockContext) -> anyhow::Result<OracleNetwork> {
    let mut ledger = InMemoryLedger::new();
    for balance in &config.chain.genesis {
        ledger.mint(balance.account, balance.amount)?;
    }
    let mut network = OracleNetwork::new(&config.network, Box::new(ledger))?;
    for pair in &config.pairs {
        network.execute_change(
            config.network.governor,
            ProtocolChange::RegisterPair {
                pair: pair.pair,
                config: pair.round.clone(),
            },
            ctx,
        )?;
        info!(pair = %pair.pair, "pair registered from config");
    }
    Ok(network)
}

/// Start the writer task.
pub fn spawn(
    network: OracleNetwork,
    clock: BlockClock,
    bus: EventBus,
    buffer: usize,
) -> (NetworkHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let task = tokio::spawn(run(network, clock, bus, rx));
    (NetworkHandle { tx }, task)
}

async fn run(
    mut network: OracleNetwork,
    clock: BlockClock,
    bus: EventBus,
    mut rx: mpsc::Receiver<Command>,
) {
    let ctx = clock.now();
    for event in network.take_events() {
        bus.emit(ctx.number, event);
    }

    while let Some(command) = rx.recv().await {
        let ctx = clock.now();
        let reply = (command.job)(&mut network, ctx);
        let events = network.take_events();
        debug!(block = ctx.number, events = events.len(), ok = reply.is_ok(), "job done");
        for event in events {
            bus.emit(ctx.number, event);
        }
        // The caller may have gone away.
        let _ = command.reply.send(reply);
    }
    info!("network writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenesisBalance, PairConfig};
    use moc_round::RoundConfig;
    use moc_types::{Address, Amount, CoinPair};

    fn config() -> DaemonConfig {
        let mut config = DaemonConfig::default();
        config.network.governor = Address::from_low_u64_be(0xaa);
        config.pairs.push(PairConfig {
            pair: CoinPair::from_name("BTCUSD").expect("pair"),
            round: RoundConfig::default(),
        });
        config.chain.genesis.push(GenesisBalance {
            account: Address::from_low_u64_be(1),
            amount: Amount::from(500),
        });
        config
    }

    #[test]
    fn test_bootstrap_registers_pairs_and_balances() {
        let mut network = bootstrap(&config(), BlockContext::new(1, 1_000)).expect("bootstrap");
        assert_eq!(network.pairs().count(), 1);
        assert_eq!(
            network.ledger().balance_of(&Address::from_low_u64_be(1)),
            Amount::from(500)
        );
        let names: Vec<_> = network.take_events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["ProtocolChangeExecuted"]);
    }

    #[test]
    fn test_bootstrap_requires_governor() {
        let mut config = config();
        config.network.governor = Address::zero();
        assert!(bootstrap(&config, BlockContext::new(1, 1_000)).is_err());
    }

    #[tokio::test]
    async fn test_writer_serializes_jobs_and_emits_events() {
        let clock = BlockClock::new(0, 30);
        let network = bootstrap(&config(), clock.now()).expect("bootstrap");
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let (handle, _task) = spawn(network, clock, bus.clone(), 4);

        let governor = Address::from_low_u64_be(0xaa);
        let reply = handle
            .call(move |network, ctx| {
                network
                    .execute_change(governor, ProtocolChange::SetNumIdleRounds { rounds: 2 }, ctx)
                    .map_err(RpcError::from)?;
                Ok(serde_json::json!(network.coordinator().num_idle_rounds()))
            })
            .await
            .expect("call");
        assert_eq!(reply, serde_json::json!(2));

        let first = events.recv().await.expect("bootstrap event");
        assert_eq!(first.event.name(), "ProtocolChangeExecuted");
        let second = events.recv().await.expect("change event");
        assert_eq!(second.sequence, 2);

        let err = handle
            .call(|network, ctx| {
                network
                    .execute_change(Address::zero(), ProtocolChange::SetNumIdleRounds { rounds: 3 }, ctx)
                    .map_err(RpcError::from)?;
                Ok(Value::Null)
            })
            .await
            .expect_err("unauthorized");
        assert_eq!(err.message, "AUTHORIZATION");
        assert_eq!(bus.sequence(), 2);
    }
}
