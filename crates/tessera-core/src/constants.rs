//! Protocol constants. Amounts are in base units of the asset they belong to.

use serde::{Deserialize, Serialize};

use crate::types::{AssetId, Hash256};

/// Identifier of the native asset minted by coinbase transactions.
pub const NATIVE_ASSET: AssetId = AssetId(Hash256([0xFF; 32]));

/// Block subsidy paid at height 1 before any reduction.
pub const INITIAL_SUBSIDY: u64 = 624_000_000_000;
/// Number of blocks between subsidy halvings.
pub const SUBSIDY_REDUCTION_INTERVAL: u64 = 840_000;
/// Native units issued by the genesis coinbase.
pub const GENESIS_ISSUANCE: u64 = 140_700_041_250_000_000;

pub const BLOCK_VERSION: u64 = 1;
pub const TX_VERSION: u64 = 1;
pub const TARGET_BLOCK_TIME_SECS: u64 = 150;
pub const DIFFICULTY_WINDOW: u64 = 30;

/// How far ahead of the local clock a block timestamp may be.
pub const MAX_FUTURE_BLOCK_TIME: u64 = 2 * 60 * 60;

pub const MAX_COINBASE_DATA: usize = 100;
pub const MAX_INPUTS: usize = 1000;
pub const MAX_OUTPUTS: usize = 1000;

/// Initial difficulty used by the public networks.
///
/// Roughly one in eight header hashes satisfies it.
pub const DEFAULT_INITIAL_BITS: u64 = 2_305_843_009_230_471_167;

/// Network type: Mainnet, Testnet, or Regtest.
///
/// Selects the genesis parameters and the data directory suffix.
///
/// # Examples
///
/// ```
/// use tessera_core::constants::NetworkType;
/// let net = NetworkType::default();
/// assert_eq!(net, NetworkType::Mainnet);
/// assert_eq!(net.data_dir_suffix(), "mainnet");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Production network.
    #[default]
    Mainnet,
    /// Public test network.
    Testnet,
    /// Local regression-test network with trivial difficulty.
    Regtest,
}

impl NetworkType {
    /// Subdirectory name appended to the base data directory path.
    pub fn data_dir_suffix(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
        }
    }

    /// Difficulty used for the genesis block and the first mined block.
    ///
    /// Regtest accepts every header hash.
    pub fn initial_bits(&self) -> u64 {
        match self {
            Self::Regtest => u64::MAX,
            _ => DEFAULT_INITIAL_BITS,
        }
    }
}

impl std::str::FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_asset_is_all_ff() {
        assert_eq!(NATIVE_ASSET.0.as_bytes(), &[0xFF; 32]);
    }

    #[test]
    fn default_bits_is_two_pow_61_plus_mantissa() {
        assert_eq!(DEFAULT_INITIAL_BITS, (1u64 << 61) + 0xFF_FFFF);
    }

    #[test]
    fn network_type_default_is_mainnet() {
        assert_eq!(NetworkType::default(), NetworkType::Mainnet);
    }

    #[test]
    fn data_dir_suffixes_distinct() {
        let suffixes = [
            NetworkType::Mainnet.data_dir_suffix(),
            NetworkType::Testnet.data_dir_suffix(),
            NetworkType::Regtest.data_dir_suffix(),
        ];
        assert_ne!(suffixes[0], suffixes[1]);
        assert_ne!(suffixes[1], suffixes[2]);
    }

    #[test]
    fn regtest_accepts_any_hash() {
        assert_eq!(NetworkType::Regtest.initial_bits(), u64::MAX);
        assert_eq!(NetworkType::Mainnet.initial_bits(), DEFAULT_INITIAL_BITS);
    }

    #[test]
    fn network_parses_case_insensitively() {
        assert_eq!("RegTest".parse::<NetworkType>().unwrap(), NetworkType::Regtest);
        assert!("moonnet".parse::<NetworkType>().is_err());
    }
}
