//! Event fan-out.
//!
//! Protocol events drained from the network after every committed call
//! are stamped with a sequence number and broadcast to subscribed RPC
//! connections. Slow subscribers lose the oldest events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moc_types::events::Event;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An event as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Position in the daemon's event stream, starting at 1.
    pub sequence: u64,
    /// Block the event was committed in.
    pub block: u64,
    /// The protocol event.
    pub event: Event,
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Event type names to deliver. `None` = all.
    #[serde(default)]
    pub types: Option<Vec<String>>,
    /// Deliver only events naming this pair, where the event has one.
    #[serde(default)]
    pub pair: Option<String>,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Notification>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, block: u64, event: Event) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(Notification {
            sequence,
            block,
            event,
        });
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl EventFilter {
    /// Check if a notification matches this filter.
    pub fn matches(&self, notification: &Notification) -> bool {
        if let Some(ref types) = self.types {
            if !types.iter().any(|t| t == notification.event.name()) {
                return false;
            }
        }
        if let Some(ref pair) = self.pair {
            if let Some(event_pair) = event_pair(&notification.event) {
                if event_pair != *pair {
                    return false;
                }
            }
        }
        true
    }
}

/// Pair name carried by an event, if any.
fn event_pair(event: &Event) -> Option<String> {
    match event {
        Event::OracleSubscribed { pair, .. }
        | Event::OracleUnsubscribed { pair, .. }
        | Event::OracleJoinedRound { pair, .. }
        | Event::OracleLeftRound { pair, .. }
        | Event::PricePublished { pair, .. }
        | Event::EmergencyPricePublished { pair, .. }
        | Event::OracleRewardTransfer { pair, .. }
        | Event::NewRound { pair, .. } => Some(pair.name()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moc_types::{Address, Amount, CoinPair};

    fn published(name: &str) -> Event {
        Event::PricePublished {
            pair: CoinPair::from_name(name).expect("pair"),
            sender: Address::from_low_u64_be(1),
            voted_oracle: Address::from_low_u64_be(1),
            price: Amount::from(5),
            block: 3,
        }
    }

    #[test]
    fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(3, published("BTCUSD"));

        let notification = rx.try_recv().expect("receive event");
        assert_eq!(notification.sequence, 1);
        assert_eq!(notification.block, 3);
        assert_eq!(notification.event.name(), "PricePublished");
        assert_eq!(bus.sequence(), 1);
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter {
            types: Some(vec!["PricePublished".to_string()]),
            pair: Some("BTCUSD".to_string()),
        };
        let wrap = |event| Notification {
            sequence: 1,
            block: 1,
            event,
        };
        assert!(filter.matches(&wrap(published("BTCUSD"))));
        assert!(!filter.matches(&wrap(published("RIFBTC"))));
        assert!(!filter.matches(&wrap(Event::PayEarnings {
            earnings: Amount::from(1),
            start: 1,
            end: 2,
        })));
        assert!(EventFilter::default().matches(&wrap(published("RIFBTC"))));
    }
}
