//! Block clock.
//!
//! The daemon runs the network outside a chain, so block height is
//! derived from wall-clock time: block 1 starts at genesis and a new
//! block begins every `block_time_secs`.

use moc_types::BlockContext;

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Maps wall-clock time to block contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockClock {
    genesis_timestamp: u64,
    block_time_secs: u64,
}

impl BlockClock {
    /// Create a clock. A zero `genesis_timestamp` means "now".
    pub fn new(genesis_timestamp: u64, block_time_secs: u64) -> Self {
        let genesis_timestamp = if genesis_timestamp == 0 {
            unix_now()
        } else {
            genesis_timestamp
        };
        Self {
            genesis_timestamp,
            block_time_secs: block_time_secs.max(1),
        }
    }

    /// Block context at `timestamp`. Times before genesis map to block 1.
    pub fn at(&self, timestamp: u64) -> BlockContext {
        let elapsed = timestamp.saturating_sub(self.genesis_timestamp);
        BlockContext::new(1 + elapsed / self.block_time_secs, timestamp)
    }

    /// Block context now.
    pub fn now(&self) -> BlockContext {
        self.at(unix_now())
    }

    /// Seconds per block.
    pub fn block_time_secs(&self) -> u64 {
        self.block_time_secs
    }

    /// Unix time of block 1.
    pub fn genesis_timestamp(&self) -> u64 {
        self.genesis_timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_numbers() {
        let clock = BlockClock::new(1_000, 30);
        assert_eq!(clock.at(1_000), BlockContext::new(1, 1_000));
        assert_eq!(clock.at(1_029).number, 1);
        assert_eq!(clock.at(1_030).number, 2);
        assert_eq!(clock.at(1_095).number, 4);
        assert_eq!(clock.at(10).number, 1);
    }

    #[test]
    fn test_zero_genesis_is_now() {
        let before = unix_now();
        let clock = BlockClock::new(0, 30);
        assert!(clock.genesis_timestamp() >= before);
        assert_eq!(clock.now().number, 1);
    }

    #[test]
    fn test_zero_block_time_clamped() {
        let clock = BlockClock::new(1_000, 0);
        assert_eq!(clock.block_time_secs(), 1);
        assert_eq!(clock.at(1_005).number, 6);
    }
}
