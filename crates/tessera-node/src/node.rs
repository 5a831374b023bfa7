//! Node composition.
//!
//! [`Node`] owns the RocksDB store, the transaction pool and the [`Chain`]
//! built over them for the configured network. Opening an empty database
//! connects that network's genesis block.
//!
//! A failed atomic commit halts the node: every later `process_block` or
//! `submit_transaction` fails with [`NodeError::Halted`] until the process
//! restarts and resumes from the last committed tip.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use tessera_core::chain::{Chain, ChainOptions, ConnectResult};
use tessera_core::constants::NetworkType;
use tessera_core::error::{ChainError, StoreError};
use tessera_core::mempool::MemoryTxPool;
use tessera_core::params::ConsensusParams;
use tessera_core::traits::{BlockAttached, BlockListener, TxPool};
use tessera_core::types::{Block, Hash256, Transaction};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::storage::RocksStore;

/// Logs every attached block.
pub struct BlockLogger;

impl BlockListener for BlockLogger {
    fn on_block_attached(&self, event: &BlockAttached) {
        info!(
            height = event.height,
            hash = %event.hash,
            txs = event.non_coinbase_transactions().count(),
            spent = event.spent.len(),
            created = event.created.len(),
            "block attached"
        );
    }
}

/// Snapshot of node state for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub network: NetworkType,
    pub genesis_hash: Hash256,
    pub height: u64,
    pub tip_hash: Hash256,
    pub pool_size: usize,
}

pub struct Node {
    config: NodeConfig,
    store: Arc<RocksStore>,
    tx_pool: Arc<MemoryTxPool>,
    chain: Chain,
    halted: Mutex<Option<StoreError>>,
}

impl Node {
    /// Open the node described by `config` with default chain options.
    pub fn open(config: NodeConfig) -> Result<Self, NodeError> {
        let options = ChainOptions::new(ConsensusParams::for_network(config.network));
        Self::open_with(config, options)
    }

    /// Open the node with explicit chain options. `options.params` decide
    /// which genesis block the chain is anchored to.
    pub fn open_with(config: NodeConfig, options: ChainOptions) -> Result<Self, NodeError> {
        if options.params.network != config.network {
            warn!(
                configured = ?config.network,
                params = ?options.params.network,
                "consensus parameters differ from configured network"
            );
        }
        std::fs::create_dir_all(config.network_dir())?;
        let store = Arc::new(RocksStore::open(config.db_path())?);
        let tx_pool = Arc::new(MemoryTxPool::new(config.tx_pool_capacity));

        let genesis = options.params.genesis_block();
        let chain = Chain::with_options(genesis.hash(), store.clone(), tx_pool.clone(), options)?;
        chain.subscribe(Arc::new(BlockLogger));

        if chain.tip().is_none() {
            info!(network = ?config.network, hash = %genesis.hash(), "empty store, connecting genesis");
            chain.connect_block(&genesis)?;
        }

        let node = Self {
            config,
            store,
            tx_pool,
            chain,
            halted: Mutex::new(None),
        };
        if let Ok(status) = node.status() {
            info!(
                network = ?status.network,
                height = status.height,
                tip = %status.tip_hash,
                "node open"
            );
        }
        Ok(node)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn store(&self) -> &RocksStore {
        &self.store
    }

    pub fn tx_pool(&self) -> &MemoryTxPool {
        &self.tx_pool
    }

    /// Save `block` and connect it on the current tip.
    pub fn process_block(&self, block: &Block) -> Result<ConnectResult, NodeError> {
        self.ensure_running()?;
        self.chain.save_block(block)?;
        self.latch(self.chain.connect_block(block))
    }

    /// Validate `tx` against the tip and stage it.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<bool, NodeError> {
        self.ensure_running()?;
        Ok(self.chain.accept_transaction(tx)?)
    }

    /// Whether a failed commit has stopped the node.
    pub fn is_halted(&self) -> bool {
        self.halted.lock().is_some()
    }

    fn ensure_running(&self) -> Result<(), NodeError> {
        match &*self.halted.lock() {
            Some(cause) => Err(NodeError::Halted(cause.clone())),
            None => Ok(()),
        }
    }

    /// Halt on [`ChainError::CommitFailed`]; pass everything else through.
    fn latch<T>(&self, result: Result<T, ChainError>) -> Result<T, NodeError> {
        if let Err(ChainError::CommitFailed(cause)) = &result {
            error!(error = %cause, "commit failed, halting node");
            *self.halted.lock() = Some(cause.clone());
        }
        Ok(result?)
    }

    pub fn status(&self) -> Result<NodeStatus, NodeError> {
        let tip = self
            .chain
            .tip()
            .ok_or(ChainError::Uninitialized)?;
        Ok(NodeStatus {
            network: self.config.network,
            genesis_hash: self.chain.genesis_hash(),
            height: tip.height,
            tip_hash: tip.hash,
            pool_size: self.tx_pool.len(),
        })
    }

    /// Flush the store to disk.
    pub fn shutdown(&self) -> Result<(), NodeError> {
        self.store.flush()?;
        info!("node shut down");
        Ok(())
    }
}
