//! The chain state machine.
//!
//! [`Chain`] owns the tip pointer and is the only writer of the UTXO set.
//! A chain starts uninitialized, connects exactly the configured genesis
//! block, then moves strictly forward one block at a time. Side branches
//! are rejected with [`ChainError::NotCurrentTip`]; there is no
//! reorganization.
//!
//! # Locking
//!
//! - `writer` serializes [`Chain::connect_block`] end to end.
//! - `state` guards the in-memory tip. Validation holds it shared while it
//!   reads the store, and connection holds it exclusively only for the
//!   atomic batch write plus the tip swap, so a validation never observes a
//!   half-applied block.
//!
//! Listeners run after the commit, still under `writer`, so they see blocks
//! in order. A listener must not call back into `connect_block`.
//!
//! # Delivery
//!
//! Notifications are at-least-once. The commit records each block's spent
//! UTXOs and its height, so an event lost to a crash between commit and
//! callback is rebuilt by [`Chain::subscribe_from`]. A listener remembers
//! the last height it handled and resubscribes from the next one.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::block_validation::{self, BlockContext, ValidatedBlock};
use crate::difficulty::{self, Sha256dWork};
use crate::error::{BlockError, ChainError};
use crate::genesis;
use crate::params::ConsensusParams;
use crate::program::StandardPredicate;
use crate::store::Store;
use crate::traits::{BlockAttached, BlockListener, ProofOfWork, SpendPredicate, TxPool};
use crate::types::{Block, BlockHeader, Hash256, Transaction, TxStatus, Utxo};
use crate::utxo::{self, UtxoSnapshot};
use crate::validation;

/// Source of the current Unix time in seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Wall-clock seconds since the Unix epoch.
pub fn system_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Pluggable pieces of a [`Chain`].
#[derive(Clone)]
pub struct ChainOptions {
    pub params: ConsensusParams,
    pub work: Arc<dyn ProofOfWork>,
    pub predicate: Arc<dyn SpendPredicate>,
    pub clock: Clock,
}

impl ChainOptions {
    /// Double SHA-256 work, the standard predicate and the system clock.
    pub fn new(params: ConsensusParams) -> Self {
        Self {
            params,
            work: Arc::new(Sha256dWork),
            predicate: Arc::new(StandardPredicate),
            clock: Arc::new(system_time),
        }
    }

    pub fn with_work(mut self, work: Arc<dyn ProofOfWork>) -> Self {
        self.work = work;
        self
    }

    pub fn with_predicate(mut self, predicate: Arc<dyn SpendPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self::new(ConsensusParams::default())
    }
}

impl std::fmt::Debug for ChainOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainOptions")
            .field("network", &self.params.network)
            .finish_non_exhaustive()
    }
}

/// The block the chain currently extends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tip {
    pub hash: Hash256,
    pub height: u64,
    pub header: BlockHeader,
}

/// Outcome of [`Chain::connect_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectResult {
    pub hash: Hash256,
    pub height: u64,
    pub spent: usize,
    pub created: usize,
}

struct ChainState {
    tip: Option<Tip>,
}

pub struct Chain {
    genesis_hash: Hash256,
    store: Arc<dyn Store>,
    tx_pool: Arc<dyn TxPool>,
    options: ChainOptions,
    writer: Mutex<()>,
    state: RwLock<ChainState>,
    listeners: RwLock<Vec<Arc<dyn BlockListener>>>,
}

impl Chain {
    /// Open a chain with default options, resuming from the persisted tip.
    pub fn new(genesis_hash: Hash256, store: Arc<dyn Store>, tx_pool: Arc<dyn TxPool>) -> Result<Self, ChainError> {
        Self::with_options(genesis_hash, store, tx_pool, ChainOptions::default())
    }

    /// Open a chain, resuming from the persisted tip if there is one.
    ///
    /// Fails with [`ChainError::StoreCorruption`] if the persisted tip names
    /// a block whose header is not in the store.
    pub fn with_options(
        genesis_hash: Hash256,
        store: Arc<dyn Store>,
        tx_pool: Arc<dyn TxPool>,
        options: ChainOptions,
    ) -> Result<Self, ChainError> {
        let tip = match store.read_tip()? {
            None => None,
            Some(record) => {
                let header = store.read_block_header(&record.hash)?.ok_or_else(|| {
                    ChainError::StoreCorruption(format!("tip {} has no stored header", record.hash))
                })?;
                if header.height != record.height {
                    return Err(ChainError::StoreCorruption(format!(
                        "tip {} recorded at height {} but header says {}",
                        record.hash, record.height, header.height
                    )));
                }
                info!(height = record.height, hash = %record.hash, "resuming from stored tip");
                Some(Tip {
                    hash: record.hash,
                    height: record.height,
                    header,
                })
            }
        };
        Ok(Self {
            genesis_hash,
            store,
            tx_pool,
            options,
            writer: Mutex::new(()),
            state: RwLock::new(ChainState { tip }),
            listeners: RwLock::new(Vec::new()),
        })
    }

    pub fn genesis_hash(&self) -> Hash256 {
        self.genesis_hash
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.options.params
    }

    pub fn tip(&self) -> Option<Tip> {
        self.state.read().tip.clone()
    }

    /// Register a listener for block-attached notifications.
    pub fn subscribe(&self, listener: Arc<dyn BlockListener>) {
        self.listeners.write().push(listener);
    }

    /// Replay every connected block from `from_height` up to the tip, then
    /// register `listener` for new blocks. Holds the writer lock throughout,
    /// so no block is missed or delivered out of order between the two.
    ///
    /// Returns the number of replayed blocks.
    pub fn subscribe_from(&self, listener: Arc<dyn BlockListener>, from_height: u64) -> Result<u64, ChainError> {
        let _writer = self.writer.lock();
        let mut replayed = 0;
        if let Some(tip) = self.tip() {
            for height in from_height..=tip.height {
                let hash = self.store.read_hash_at(height)?.ok_or_else(|| {
                    ChainError::StoreCorruption(format!("no connected block at height {height}"))
                })?;
                listener.on_block_attached(&self.attached_event(&hash)?);
                replayed += 1;
            }
        }
        if replayed > 0 {
            info!(from = from_height, replayed, "replayed block notifications");
        }
        self.listeners.write().push(listener);
        Ok(replayed)
    }

    /// Rebuild the notification for the connected block `hash`.
    pub fn attached_event(&self, hash: &Hash256) -> Result<BlockAttached, ChainError> {
        let block = self.get_block_by_hash(hash)?;
        let spent = self
            .store
            .read_spent(hash)?
            .ok_or_else(|| ChainError::StoreCorruption(format!("block {hash} has no undo data")))?;
        Ok(BlockAttached {
            hash: *hash,
            height: block.height(),
            spent,
            created: utxo::created_utxos(&block),
            block: Arc::new(block),
        })
    }

    /// Persist `block` by hash regardless of whether it extends the tip.
    /// Saving the same block again is a no-op.
    pub fn save_block(&self, block: &Block) -> Result<Hash256, ChainError> {
        let hash = block.hash();
        self.store.write_block(&hash, block)?;
        debug!(height = block.height(), hash = %hash, "saved block");
        Ok(hash)
    }

    pub fn get_block_by_hash(&self, hash: &Hash256) -> Result<Block, ChainError> {
        self.store.read_block(hash)?.ok_or(ChainError::NotFound(*hash))
    }

    pub fn get_utxo(&self, output_id: &Hash256) -> Result<Option<Utxo>, ChainError> {
        let _state = self.state.read();
        Ok(self.store.read_utxo(output_id)?)
    }

    /// Transaction status bitmap recorded when `block_hash` was connected.
    pub fn get_tx_status(&self, block_hash: &Hash256) -> Result<TxStatus, ChainError> {
        self.store
            .read_tx_status(block_hash)?
            .ok_or(ChainError::NotFound(*block_hash))
    }

    /// Bits the next block on the current tip must carry.
    pub fn next_bits(&self) -> Result<u64, ChainError> {
        let tip = self.tip().ok_or(ChainError::Uninitialized)?;
        self.expected_bits(&tip.header, tip.height + 1)
    }

    /// Check `block` against its parent `prev` and the UTXO set as of `prev`.
    ///
    /// Mutates nothing. Only the tip's UTXO set is materialized, so `prev`
    /// must be the current tip; any other parent fails with
    /// [`ChainError::NotCurrentTip`], and an empty chain with
    /// [`ChainError::Uninitialized`].
    pub fn validate_block(&self, block: &Block, prev: &Block) -> Result<ValidatedBlock, ChainError> {
        let state = self.state.read();
        let tip = state.tip.as_ref().ok_or(ChainError::Uninitialized)?;
        let prev_hash = prev.hash();
        if prev_hash != tip.hash {
            return Err(ChainError::NotCurrentTip {
                tip: tip.hash,
                parent: prev_hash,
            });
        }
        self.validate_against(block, &prev.header, prev_hash)
    }

    /// Validate and apply a block extending the current tip.
    ///
    /// On an empty chain only the configured genesis block is accepted. The
    /// UTXO changes, transaction status and new tip are written in one atomic
    /// batch; if that write fails the in-memory tip is left untouched and
    /// [`ChainError::CommitFailed`] is returned. The node should then stop
    /// and restart from the last committed tip.
    pub fn connect_block(&self, block: &Block) -> Result<ConnectResult, ChainError> {
        let _writer = self.writer.lock();
        let hash = block.hash();

        let validated = match self.tip() {
            None => self.validate_genesis_block(block, hash)?,
            Some(tip) => {
                if block.header.prev_hash != tip.hash {
                    return Err(ChainError::NotCurrentTip {
                        tip: tip.hash,
                        parent: block.header.prev_hash,
                    });
                }
                let _state = self.state.read();
                self.validate_against(block, &tip.header, tip.hash)?
            }
        };

        self.store.write_block(&hash, block)?;

        let delta = utxo::block_delta(block, &validated.spent, &validated.created);
        {
            let mut state = self.state.write();
            if let Err(e) = self.store.batch_write_utxo_delta(&delta) {
                error!(height = validated.height, hash = %hash, error = %e, "atomic commit failed");
                return Err(ChainError::CommitFailed(e));
            }
            state.tip = Some(Tip {
                hash,
                height: validated.height,
                header: block.header.clone(),
            });
        }

        self.tx_pool.remove_confirmed(block);

        let result = ConnectResult {
            hash,
            height: validated.height,
            spent: validated.spent.len(),
            created: validated.created.len(),
        };
        info!(
            height = result.height,
            hash = %hash,
            txs = block.transactions.len(),
            spent = result.spent,
            created = result.created,
            "block connected"
        );

        let event = BlockAttached {
            block: Arc::new(block.clone()),
            hash,
            height: validated.height,
            spent: validated.spent,
            created: validated.created,
        };
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_block_attached(&event);
        }
        Ok(result)
    }

    /// Validate a loose transaction against the tip and stage it in the
    /// pool. Returns `false` if the pool already holds it.
    pub fn accept_transaction(&self, tx: Transaction) -> Result<bool, ChainError> {
        {
            let state = self.state.read();
            if state.tip.is_none() {
                return Err(ChainError::Uninitialized);
            }
            let ids = tx
                .inputs
                .iter()
                .filter_map(|i| i.spent_output_id().copied())
                .chain(tx.output_ids());
            let snapshot = UtxoSnapshot::load(self.store.as_ref(), ids)?;
            let now = (self.options.clock)();
            if let Err(e) = validation::validate_transaction(&tx, now, |id| snapshot.lookup(id), self.options.predicate.as_ref()) {
                warn!(tx = %tx.id(), error = %e, "rejected transaction");
                return Err(e.into());
            }
        }
        Ok(self.tx_pool.add(tx)?)
    }

    fn validate_genesis_block(&self, block: &Block, hash: Hash256) -> Result<ValidatedBlock, ChainError> {
        if hash != self.genesis_hash {
            return Err(BlockError::Genesis(format!(
                "chain is empty and {hash} is not genesis {}",
                self.genesis_hash
            ))
            .into());
        }
        genesis::validate_genesis(block, &self.options.params.genesis)?;
        Ok(ValidatedBlock {
            hash,
            height: 0,
            spent: Vec::new(),
            created: utxo::created_utxos(block),
            tx_status: block.header.tx_status.clone(),
        })
    }

    /// Callers hold `state` shared so the store does not move underneath.
    fn validate_against(&self, block: &Block, parent: &BlockHeader, parent_hash: Hash256) -> Result<ValidatedBlock, ChainError> {
        let snapshot = UtxoSnapshot::for_block(self.store.as_ref(), block)?;
        let expected_bits = self.expected_bits(parent, parent.height + 1)?;
        let ctx = BlockContext {
            parent,
            parent_hash,
            expected_bits,
            now: (self.options.clock)(),
            params: &self.options.params,
            work: self.options.work.as_ref(),
            predicate: self.options.predicate.as_ref(),
        };
        block_validation::validate_block(block, &ctx, |id| snapshot.lookup(id)).map_err(|e| {
            debug!(height = block.height(), error = %e, "block failed validation");
            ChainError::from(e)
        })
    }

    /// Retarget for `height`, walking ancestor headers back from `parent`.
    fn expected_bits(&self, parent: &BlockHeader, height: u64) -> Result<u64, ChainError> {
        let params = &self.options.params;
        let wanted = difficulty::window_len(height, params.retarget_window) as usize;
        let mut timestamps = Vec::with_capacity(wanted);
        let mut cursor = parent.clone();
        if wanted > 0 {
            timestamps.push(cursor.timestamp);
        }
        while timestamps.len() < wanted {
            cursor = self.store.read_block_header(&cursor.prev_hash)?.ok_or_else(|| {
                ChainError::StoreCorruption(format!("missing ancestor header {}", cursor.prev_hash))
            })?;
            timestamps.push(cursor.timestamp);
        }
        timestamps.reverse();
        Ok(difficulty::bits_for_height(
            height,
            parent.bits,
            params.genesis.bits,
            &timestamps,
            params.target_block_time,
        ))
    }
}
