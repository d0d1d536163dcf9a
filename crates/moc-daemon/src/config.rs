//! Configuration file management.
//!
//! `config.toml` lives in the data directory (`$MOC_DATA_DIR`, or
//! `~/.moc`). Amounts are 0x-prefixed hex strings, as everywhere else
//! on the RPC surface.

use std::path::PathBuf;

use moc_manager::NetworkConfig;
use moc_round::RoundConfig;
use moc_types::{Address, Amount, CoinPair};
use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Network-wide protocol parameters.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Pairs registered at startup.
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
    /// Block clock and genesis ledger.
    #[serde(default)]
    pub chain: ChainConfig,
    /// Process settings.
    #[serde(default)]
    pub daemon: DaemonSettings,
}

/// A pair tracked from startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    /// Pair name, e.g. "BTCUSD".
    #[serde(rename = "name")]
    pub pair: CoinPair,
    /// Round parameters.
    #[serde(flatten)]
    pub round: RoundConfig,
}

/// Chain time and initial balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Seconds per block.
    #[serde(default = "default_block_time")]
    pub block_time_secs: u64,
    /// Unix time of block 1. 0 = daemon start time.
    #[serde(default)]
    pub genesis_timestamp: u64,
    /// Collateral minted into the ledger at startup.
    #[serde(default)]
    pub genesis: Vec<GenesisBalance>,
}

/// An initial ledger balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub account: Address,
    pub amount: Amount,
}

/// Process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// Control socket path. Empty = $data_dir/moc.sock.
    #[serde(default)]
    pub socket_path: String,
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Pending commands buffered for the network writer.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

// Default value functions

fn default_block_time() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_command_buffer() -> usize {
    256
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            block_time_secs: default_block_time(),
            genesis_timestamp: 0,
            genesis: Vec::new(),
        }
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            socket_path: String::new(),
            log_level: default_log_level(),
            command_buffer: default_command_buffer(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and check a configuration document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        if config.chain.block_time_secs == 0 {
            anyhow::bail!("chain.block_time_secs must be non-zero");
        }
        for (i, pair) in config.pairs.iter().enumerate() {
            if config.pairs[..i].iter().any(|p| p.pair == pair.pair) {
                anyhow::bail!("pair {} configured twice", pair.pair);
            }
        }
        Ok(config)
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.daemon.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.daemon.data_dir)
        }
    }

    /// Get the control socket path.
    pub fn socket_path(&self) -> PathBuf {
        if self.daemon.socket_path.is_empty() {
            self.data_dir().join("moc.sock")
        } else {
            PathBuf::from(&self.daemon.socket_path)
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Default data directory, overridable with `MOC_DATA_DIR`.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("MOC_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".moc"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/moc"))
    }
}
