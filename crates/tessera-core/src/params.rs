//! Consensus parameters per network.

use serde::{Deserialize, Serialize};

use crate::constants::{DIFFICULTY_WINDOW, MAX_FUTURE_BLOCK_TIME, NetworkType, TARGET_BLOCK_TIME_SECS};
use crate::genesis::{GenesisParams, build_genesis};
use crate::reward::SubsidySchedule;
use crate::types::{Block, Hash256};

/// Everything validation needs to know about a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub network: NetworkType,
    pub genesis: GenesisParams,
    pub subsidy: SubsidySchedule,
    /// Seconds between blocks the retarget aims for.
    pub target_block_time: u64,
    /// Number of block intervals in the retarget window.
    pub retarget_window: u64,
    /// How far ahead of the local clock a block timestamp may be, in seconds.
    pub max_future_drift: u64,
}

impl ConsensusParams {
    pub fn for_network(network: NetworkType) -> Self {
        Self {
            network,
            genesis: GenesisParams::for_network(network),
            subsidy: SubsidySchedule::default(),
            target_block_time: TARGET_BLOCK_TIME_SECS,
            retarget_window: DIFFICULTY_WINDOW,
            max_future_drift: MAX_FUTURE_BLOCK_TIME,
        }
    }

    pub fn mainnet() -> Self {
        Self::for_network(NetworkType::Mainnet)
    }

    pub fn regtest() -> Self {
        Self::for_network(NetworkType::Regtest)
    }

    pub fn genesis_block(&self) -> Block {
        build_genesis(&self.genesis)
    }

    pub fn genesis_hash(&self) -> Hash256 {
        self.genesis_block().hash()
    }

    /// Native units the coinbase at `height` must mint.
    pub fn coinbase_amount(&self, height: u64) -> u64 {
        if height == 0 {
            self.genesis.issuance
        } else {
            self.subsidy.subsidy(height)
        }
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{GENESIS_ISSUANCE, INITIAL_SUBSIDY};

    #[test]
    fn default_is_mainnet() {
        assert_eq!(ConsensusParams::default().network, NetworkType::Mainnet);
    }

    #[test]
    fn coinbase_amount_covers_genesis_and_schedule() {
        let params = ConsensusParams::regtest();
        assert_eq!(params.coinbase_amount(0), GENESIS_ISSUANCE);
        assert_eq!(params.coinbase_amount(1), INITIAL_SUBSIDY);
    }

    #[test]
    fn genesis_hash_matches_block() {
        let params = ConsensusParams::regtest();
        assert_eq!(params.genesis_hash(), params.genesis_block().hash());
        assert_ne!(params.genesis_hash(), ConsensusParams::mainnet().genesis_hash());
    }
}
