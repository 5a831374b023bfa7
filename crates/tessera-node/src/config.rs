//! Node configuration.
//!
//! [`NodeConfig`] has defaults for every field. [`NodeConfig::load`] layers
//! an optional TOML file and `TESSERA_*` environment variables on top of
//! them, e.g. `TESSERA_NETWORK=regtest` or `TESSERA_TX_POOL_CAPACITY=100`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tessera_core::constants::NetworkType;
use tessera_core::mempool::DEFAULT_MAX_COUNT;

use crate::error::NodeError;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "TESSERA";

/// Configuration for a node instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network: NetworkType,
    /// Base directory; each network keeps its data in its own subdirectory.
    pub data_dir: PathBuf,
    /// Log filter string (e.g. "info", "tessera_core=debug").
    pub log_level: String,
    /// Emit JSON log lines instead of text.
    pub log_json: bool,
    /// Maximum number of staged transactions.
    pub tx_pool_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tessera");

        Self {
            network: NetworkType::default(),
            data_dir,
            log_level: "info".to_string(),
            log_json: false,
            tx_pool_capacity: DEFAULT_MAX_COUNT,
        }
    }
}

impl NodeConfig {
    /// Defaults, then `file` if given and present, then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, NodeError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Directory holding this network's data.
    pub fn network_dir(&self) -> PathBuf {
        self.data_dir.join(self.network.data_dir_suffix())
    }

    /// Path to the RocksDB chain database.
    pub fn db_path(&self) -> PathBuf {
        self.network_dir().join("chaindata")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.network, NetworkType::Mainnet);
        assert_eq!(cfg.log_level, "info");
        assert!(!cfg.log_json);
        assert_eq!(cfg.tx_pool_capacity, DEFAULT_MAX_COUNT);
        assert!(cfg.data_dir.ends_with("tessera"), "data_dir: {:?}", cfg.data_dir);
    }

    #[test]
    fn db_path_is_per_network() {
        let cfg = NodeConfig {
            network: NetworkType::Regtest,
            data_dir: PathBuf::from("/tmp/tessera-test"),
            ..NodeConfig::default()
        };
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/tessera-test/regtest/chaindata"));
    }

    #[test]
    fn load_reads_toml_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tessera.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "network = \"testnet\"").unwrap();
        writeln!(file, "tx_pool_capacity = 42").unwrap();
        drop(file);

        let cfg = NodeConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.network, NetworkType::Testnet);
        assert_eq!(cfg.tx_pool_capacity, 42);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn load_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = NodeConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.tx_pool_capacity, NodeConfig::default().tx_pool_capacity);
    }

    #[test]
    fn load_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "network = \"moonnet\"\n").unwrap();
        assert!(matches!(NodeConfig::load(Some(&path)), Err(NodeError::Config(_))));
    }
}
