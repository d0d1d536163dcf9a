//! Integration test: one pair through its whole lifecycle.
//!
//! Exercises the full loop across every component:
//! 1. Governance whitelists a reader, an emergency publisher and a locker
//! 2. Three oracles stake, register and subscribe to a two-seat pair
//! 3. Members publish co-signed prices and earn points
//! 4. Readers see the price expire; the emergency publisher steps in
//! 5. Fees are paid out by points at the round switch
//! 6. A stake drop hands the seat to the waiting subscriber
//! 7. A stake lock blocks withdrawals until it expires
//! 8. An idle oracle is removed and keeps its pool balance

use moc_crypto::{PriceMessage, Signature, SigningKey};
use moc_manager::network::staking_account;
use moc_manager::{ManagerError, NetworkConfig, OracleNetwork, ProtocolChange};
use moc_round::{RoundConfig, RoundError};
use moc_staking::{CollateralLedger, InMemoryLedger, StakingError};
use moc_types::events::Event;
use moc_types::{Address, Amount, BlockContext, CoinPair, PRICE_MESSAGE_VERSION};

const GOVERNOR: u64 = 0x90;
const READER: u64 = 0xa0;
const EMERGENCY: u64 = 0xa1;
const LOCKER: u64 = 0xa2;

fn ctx(block: u64) -> BlockContext {
    BlockContext::new(block, 1_000 + block * 30)
}

fn account(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

fn btc() -> CoinPair {
    CoinPair::from_name("BTCUSD").expect("pair")
}

struct Oracle {
    owner: Address,
    key: SigningKey,
}

impl Oracle {
    fn new(n: u8) -> Self {
        Self {
            owner: account(u64::from(n)),
            key: SigningKey::from_bytes(&[n; 32]).expect("key"),
        }
    }

    fn address(&self) -> Address {
        self.key.address()
    }
}

fn governed(network: &mut OracleNetwork, change: ProtocolChange) {
    network
        .execute_change(account(GOVERNOR), change, ctx(1))
        .expect("change");
}

fn setup(oracles: &[Oracle], stakes: &[u64]) -> OracleNetwork {
    let mut ledger = InMemoryLedger::new();
    for oracle in oracles {
        ledger.mint(oracle.owner, Amount::from(1_000)).expect("mint");
        ledger.approve(oracle.owner, staking_account(), Amount::max_value());
    }
    let config = NetworkConfig {
        governor: account(GOVERNOR),
        min_subscription_stake: Amount::from(10),
        ..NetworkConfig::default()
    };
    let mut network = OracleNetwork::new(&config, Box::new(ledger)).expect("network");

    governed(
        &mut network,
        ProtocolChange::RegisterPair {
            pair: btc(),
            config: RoundConfig {
                min_oracles_per_round: 1,
                max_oracles_per_round: 2,
                ..RoundConfig::default()
            },
        },
    );
    governed(
        &mut network,
        ProtocolChange::AddToReadWhitelist {
            pair: btc(),
            account: account(READER),
        },
    );
    governed(
        &mut network,
        ProtocolChange::AddToEmergencyWhitelist {
            pair: btc(),
            account: account(EMERGENCY),
        },
    );
    governed(&mut network, ProtocolChange::AddLocker { account: account(LOCKER) });

    for (oracle, stake) in oracles.iter().zip(stakes) {
        network
            .deposit(oracle.owner, Amount::from(*stake), oracle.owner, ctx(1))
            .expect("deposit");
        network
            .register_oracle(oracle.owner, oracle.address(), "oracle.example".to_string(), ctx(1))
            .expect("register");
        network.subscribe(oracle.owner, btc(), ctx(1)).expect("subscribe");
    }
    network.take_events();
    network
}

fn publish(network: &mut OracleNetwork, voter: &Oracle, cosigner: &Oracle, price: u64, block: u64) {
    let message = PriceMessage {
        version: PRICE_MESSAGE_VERSION,
        pair: btc(),
        price: Amount::from(price),
        voted_oracle: voter.address(),
        last_publication_block: network.pair(&btc()).expect("pair").last_publication_block(),
    };
    let mut signed: Vec<(Address, Signature)> = [voter, cosigner]
        .iter()
        .map(|o| (o.address(), message.sign(&o.key)))
        .collect();
    signed.sort_by_key(|(address, _)| *address);
    let signatures: Vec<Signature> = signed.into_iter().map(|(_, s)| s).collect();
    network
        .publish_price(voter.address(), &message, &signatures, ctx(block))
        .expect("publish");
}

#[test]
fn pair_lifecycle() {
    let oracles: Vec<Oracle> = (1u8..=3).map(Oracle::new).collect();
    let (o1, o2, o3) = (&oracles[0], &oracles[1], &oracles[2]);
    let mut network = setup(&oracles, &[300, 200, 100]);

    // Two seats: the third subscriber waits.
    let info = network.get_round_info(&btc()).expect("info");
    assert_eq!(info.selected, vec![o1.address(), o2.address()]);

    let switched = network.switch_round(o3.owner, btc(), ctx(2)).expect("switch");
    assert_eq!(switched.round, 2);
    assert_eq!(switched.selected.len(), 2);

    // =========================================================
    // Publications
    // =========================================================
    publish(&mut network, o1, o2, 50_000, 3);
    publish(&mut network, o2, o1, 50_100, 4);
    publish(&mut network, o1, o2, 50_200, 5);
    assert_eq!(
        network.get_oracle_round_info(&btc(), &o1.address()).expect("info").points,
        2
    );
    assert_eq!(network.get_round_info(&btc()).expect("info").total_points, 3);

    let err = network
        .get_price(&o3.owner, &btc(), ctx(5))
        .expect_err("not a reader");
    assert!(matches!(err, ManagerError::Round(RoundError::NotWhitelisted(_))));
    assert_eq!(
        network.get_price(&account(READER), &btc(), ctx(8)).expect("price"),
        Amount::from(50_200)
    );
    assert!(matches!(
        network.get_price(&account(READER), &btc(), ctx(9)),
        Err(ManagerError::Round(RoundError::PriceExpired { .. }))
    ));

    // =========================================================
    // Emergency publication
    // =========================================================
    assert!(matches!(
        network.emergency_publish(account(EMERGENCY), btc(), Amount::from(49_000), ctx(6)),
        Err(ManagerError::Round(RoundError::EmergencyPeriodNotStarted { .. }))
    ));
    assert!(matches!(
        network.emergency_publish(o1.address(), btc(), Amount::from(49_000), ctx(9)),
        Err(ManagerError::Round(RoundError::NotWhitelisted(_)))
    ));
    network
        .emergency_publish(account(EMERGENCY), btc(), Amount::from(49_000), ctx(9))
        .expect("emergency");
    let (price, valid) = network.peek(&account(READER), &btc(), ctx(10)).expect("peek");
    assert_eq!(price, Amount::from(49_000));
    assert!(valid);

    // =========================================================
    // Fees paid by points
    // =========================================================
    let fee_account = network.pair(&btc()).expect("pair").fee_account();
    network.ledger_mut().mint(fee_account, Amount::from(300)).expect("fees");
    assert_eq!(network.available_reward_fees(&btc()).expect("fees"), Amount::from(300));
    network.take_events();

    let switched = network.switch_round(o3.owner, btc(), ctx(10)).expect("switch");
    assert_eq!(switched.distributed, Amount::from(300));
    assert_eq!(network.ledger().balance_of(&o1.owner), Amount::from(700 + 200));
    assert_eq!(network.ledger().balance_of(&o2.owner), Amount::from(800 + 100));
    assert!(network.available_reward_fees(&btc()).expect("fees").is_zero());

    let events = network.take_events();
    let names: Vec<_> = events.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["OracleRewardTransfer", "OracleRewardTransfer", "NewRound"]);
    assert!(matches!(
        &events[2],
        Event::NewRound { number: 3, selected, .. } if selected.len() == 2
    ));

    // =========================================================
    // Stake drop hands the seat over
    // =========================================================
    network
        .withdraw(o2.owner, Amount::from(150), ctx(11))
        .expect("withdraw");
    let names: Vec<_> = network.take_events().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["StakeWithdrawn", "OracleLeftRound", "OracleJoinedRound"]);
    let info = network.get_round_info(&btc()).expect("info");
    assert!(info.selected.contains(&o3.address()));
    assert!(!info.selected.contains(&o2.address()));
    assert!(network.is_subscribed(&o2.owner, &btc()).expect("pair"));
    assert_eq!(
        network.get_oracle_registration_info(&o2.owner).expect("entry").stake,
        Amount::from(50)
    );

    // =========================================================
    // Stake lock
    // =========================================================
    assert!(matches!(
        network.lock_stake(o1.owner, o1.owner, ctx(20).timestamp, ctx(11)),
        Err(ManagerError::Staking(StakingError::NotWhitelisted(_)))
    ));
    let lock = network
        .lock_stake(account(LOCKER), o1.owner, ctx(20).timestamp, ctx(11))
        .expect("lock");
    assert_eq!(lock.amount, Amount::from(300));
    assert!(matches!(
        network.withdraw(o1.owner, Amount::from(10), ctx(12)),
        Err(ManagerError::Staking(StakingError::StakeLocked { .. }))
    ));
    assert_eq!(network.get_locked_balance(&o1.owner, ctx(20)), Amount::zero());

    // =========================================================
    // Removal after an idle round
    // =========================================================
    network.unsubscribe(o3.owner, btc()).expect("unsubscribe");
    assert!(matches!(
        network.remove_oracle(o3.owner),
        Err(ManagerError::NotReadyToRemove { .. })
    ));
    let switched = network.switch_round(o1.owner, btc(), ctx(13)).expect("switch");
    assert_eq!(switched.round, 4);
    assert!(switched.selected.iter().all(|(owner, _)| *owner != o3.owner));

    let removed = network.remove_oracle(o3.owner).expect("remove");
    assert_eq!(removed.address, o3.address());
    assert!(!network.is_oracle_registered(&o3.owner));
    assert_eq!(network.get_oracle_owner(&o3.address()), None);
    assert_eq!(network.get_balance(&o3.owner, ctx(13)), Amount::from(100));

    // Withdrawing the rest lands in the vault.
    let receipt = network.withdraw(o3.owner, Amount::from(100), ctx(13)).expect("withdraw");
    assert_eq!(receipt.amount, Amount::from(100));
    assert_eq!(network.pending_withdrawals(&o3.owner).len(), 1);
}
