//! Round parameters.

use moc_types::{Address, Amount};
use serde::{Deserialize, Serialize};

use crate::{Result, RoundError};

/// Parameters of one pair's rounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundConfig {
    /// Below this many selected oracles a round is flagged, not blocked.
    #[serde(default = "default_min_oracles")]
    pub min_oracles_per_round: usize,
    /// Round size cap.
    #[serde(default = "default_max_oracles")]
    pub max_oracles_per_round: usize,
    /// Subscription list cap.
    #[serde(default = "default_max_subscribed")]
    pub max_subscribed_oracles: usize,
    /// Minimum round duration in seconds.
    #[serde(default = "default_round_lock_period")]
    pub round_lock_period_secs: u64,
    /// Blocks a published price stays valid.
    #[serde(default = "default_valid_price_period")]
    pub valid_price_period_in_blocks: u64,
    /// Blocks without publication before emergency publishing opens.
    #[serde(default = "default_emergency_period")]
    pub emergency_publishing_period_in_blocks: u64,
    /// Price in effect before the first publication.
    #[serde(default = "default_bootstrap_price")]
    pub bootstrap_price: Amount,
    /// Initial readers allowed to peek.
    #[serde(default)]
    pub read_whitelist: Vec<Address>,
    /// Initial emergency publishers.
    #[serde(default)]
    pub emergency_whitelist: Vec<Address>,
}

fn default_min_oracles() -> usize {
    3
}

fn default_max_oracles() -> usize {
    10
}

fn default_max_subscribed() -> usize {
    30
}

fn default_round_lock_period() -> u64 {
    60
}

fn default_valid_price_period() -> u64 {
    3
}

fn default_emergency_period() -> u64 {
    2
}

fn default_bootstrap_price() -> Amount {
    Amount::from(100_000_000u64)
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            min_oracles_per_round: default_min_oracles(),
            max_oracles_per_round: default_max_oracles(),
            max_subscribed_oracles: default_max_subscribed(),
            round_lock_period_secs: default_round_lock_period(),
            valid_price_period_in_blocks: default_valid_price_period(),
            emergency_publishing_period_in_blocks: default_emergency_period(),
            bootstrap_price: default_bootstrap_price(),
            read_whitelist: Vec::new(),
            emergency_whitelist: Vec::new(),
        }
    }
}

impl RoundConfig {
    /// Check the parameters are mutually consistent.
    pub fn validate(&self) -> Result<()> {
        if self.min_oracles_per_round == 0 {
            return Err(RoundError::InvalidConfig(
                "min oracles per round must be at least 1".to_string(),
            ));
        }
        if self.min_oracles_per_round > self.max_oracles_per_round {
            return Err(RoundError::InvalidConfig(format!(
                "min oracles per round {} exceeds max {}",
                self.min_oracles_per_round, self.max_oracles_per_round
            )));
        }
        if self.max_oracles_per_round > self.max_subscribed_oracles {
            return Err(RoundError::InvalidConfig(format!(
                "max oracles per round {} exceeds max subscribed {}",
                self.max_oracles_per_round, self.max_subscribed_oracles
            )));
        }
        if self.round_lock_period_secs == 0 {
            return Err(RoundError::InvalidConfig(
                "round lock period must be non-zero".to_string(),
            ));
        }
        if self.emergency_publishing_period_in_blocks == 0 {
            return Err(RoundError::InvalidConfig(
                "emergency publishing period must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RoundConfig::default();
        config.validate().expect("defaults are valid");
        assert_eq!(config.bootstrap_price, Amount::from(100_000_000u64));
    }

    #[test]
    fn test_validate_bounds() {
        let config = RoundConfig {
            min_oracles_per_round: 5,
            max_oracles_per_round: 4,
            ..RoundConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RoundConfig {
            max_oracles_per_round: 40,
            ..RoundConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RoundConfig {
            round_lock_period_secs: 0,
            ..RoundConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
