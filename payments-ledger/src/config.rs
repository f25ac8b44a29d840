//! Configuration for the payments ledger

use crate::types::U256;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Indexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Batching configuration
    pub batching: BatchingConfig,

    /// Ledger semantics
    pub ledger: LedgerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/payments-ledger"),
            service_name: "payments-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDBConfig::default(),
            batching: BatchingConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Level 0 file num compaction trigger
    pub level0_file_num_compaction_trigger: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            level0_file_num_compaction_trigger: 4,
            enable_statistics: false,
        }
    }
}

/// Batching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Maximum batch size (events)
    pub max_batch_size: usize,

    /// Batch timeout (milliseconds)
    pub batch_timeout_ms: u64,

    /// Enable batching; when off every event is flushed on its own
    pub enabled: bool,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 500,   // events per flush
            batch_timeout_ms: 50,
            enabled: true,
        }
    }
}

/// Ledger semantics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Network fee burned per settlement, as read from the contract
    pub network_fee: U256,

    /// Mailbox capacity of the indexer actor
    pub mailbox_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            network_fee: U256::zero(),
            mailbox_capacity: 10_000,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(fee) = std::env::var("LEDGER_NETWORK_FEE") {
            config.ledger.network_fee = U256::from_dec_str(fee.trim()).map_err(|e| {
                crate::Error::Config(format!("Invalid LEDGER_NETWORK_FEE {:?}: {:?}", fee, e))
            })?;
        }

        if let Ok(batching) = std::env::var("LEDGER_BATCHING") {
            config.batching.enabled = batching.trim().parse().map_err(|e| {
                crate::Error::Config(format!("Invalid LEDGER_BATCHING {:?}: {}", batching, e))
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "payments-ledger");
        assert!(config.batching.enabled);
        assert!(config.ledger.network_fee.is_zero());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.toml");
        let mut config = Config::default();
        config.ledger.network_fee = U256::from(5);
        config.batching.max_batch_size = 8;
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.ledger.network_fee, U256::from(5));
        assert_eq!(loaded.batching.max_batch_size, 8);
    }

    #[test]
    fn test_from_file_rejects_garbage() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.toml");
        std::fs::write(&path, "data_dir = [").unwrap();

        assert!(matches!(Config::from_file(&path), Err(crate::Error::Config(_))));
    }
}
