//! Persistent store interface and an in-memory implementation.
//!
//! The chain reaches storage only through [`Store`]: single-key reads, an
//! idempotent block write, and one atomic batch that applies a block's UTXO
//! changes together with the new tip. The same batch records what the block
//! spent and which block sits at its height, so block-attached events can be
//! rebuilt after a restart. [`MemoryStore`] backs tests and
//! benchmarks; the node crate provides a RocksDB implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{Block, BlockHeader, Hash256, TxStatus, Utxo};

/// Persisted pointer to the chain tip.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TipRecord {
    pub hash: Hash256,
    pub height: u64,
}

/// Everything one block connection changes, applied as a unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtxoDelta {
    pub block_hash: Hash256,
    /// UTXOs to delete, as they were before the spend. Kept as undo data.
    pub spent: Vec<Utxo>,
    /// UTXOs to insert.
    pub created: Vec<Utxo>,
    pub tx_status: TxStatus,
    pub tip: TipRecord,
}

/// Storage seam of the chain.
///
/// Read failures may be retried by the caller. A failed
/// [`batch_write_utxo_delta`](Store::batch_write_utxo_delta) must leave the
/// store as it was before the call.
pub trait Store: Send + Sync {
    fn read_block_header(&self, hash: &Hash256) -> Result<Option<BlockHeader>, StoreError>;

    fn read_block(&self, hash: &Hash256) -> Result<Option<Block>, StoreError>;

    /// Persist header and body under `hash`. Writing the same block twice
    /// leaves the store unchanged.
    fn write_block(&self, hash: &Hash256, block: &Block) -> Result<(), StoreError>;

    fn read_utxo(&self, output_id: &Hash256) -> Result<Option<Utxo>, StoreError>;

    fn read_tip(&self) -> Result<Option<TipRecord>, StoreError>;

    fn read_tx_status(&self, block_hash: &Hash256) -> Result<Option<TxStatus>, StoreError>;

    /// UTXOs spent by the connected block `block_hash`.
    fn read_spent(&self, block_hash: &Hash256) -> Result<Option<Vec<Utxo>>, StoreError>;

    /// Hash of the connected block at `height`.
    fn read_hash_at(&self, height: u64) -> Result<Option<Hash256>, StoreError>;

    /// Atomically remove spent UTXOs, insert created ones, record the
    /// block's transaction status, spent UTXOs and height, and move the tip.
    fn batch_write_utxo_delta(&self, delta: &UtxoDelta) -> Result<(), StoreError>;

    fn contains_utxo(&self, output_id: &Hash256) -> Result<bool, StoreError> {
        Ok(self.read_utxo(output_id)?.is_some())
    }
}

#[derive(Default)]
struct MemoryInner {
    headers: HashMap<Hash256, BlockHeader>,
    blocks: HashMap<Hash256, Block>,
    utxos: HashMap<Hash256, Utxo>,
    tx_status: HashMap<Hash256, TxStatus>,
    spent: HashMap<Hash256, Vec<Utxo>>,
    heights: HashMap<u64, Hash256>,
    tip: Option<TipRecord>,
}

/// In-memory [`Store`] for tests and benchmarks.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
    fail_commits: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a UTXO directly, bypassing block connection.
    pub fn seed_utxo(&self, utxo: Utxo) {
        self.inner.write().utxos.insert(utxo.output_id, utxo);
    }

    /// Overwrite the tip record directly.
    pub fn set_tip(&self, tip: TipRecord) {
        self.inner.write().tip = Some(tip);
    }

    /// Make every following batch write fail until reset.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn utxo_count(&self) -> usize {
        self.inner.read().utxos.len()
    }

    pub fn block_count(&self) -> usize {
        self.inner.read().blocks.len()
    }

    /// Copy of the full UTXO set.
    pub fn utxos(&self) -> HashMap<Hash256, Utxo> {
        self.inner.read().utxos.clone()
    }
}

impl Store for MemoryStore {
    fn read_block_header(&self, hash: &Hash256) -> Result<Option<BlockHeader>, StoreError> {
        Ok(self.inner.read().headers.get(hash).cloned())
    }

    fn read_block(&self, hash: &Hash256) -> Result<Option<Block>, StoreError> {
        Ok(self.inner.read().blocks.get(hash).cloned())
    }

    fn write_block(&self, hash: &Hash256, block: &Block) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.headers.insert(*hash, block.header.clone());
        inner.blocks.insert(*hash, block.clone());
        Ok(())
    }

    fn read_utxo(&self, output_id: &Hash256) -> Result<Option<Utxo>, StoreError> {
        Ok(self.inner.read().utxos.get(output_id).cloned())
    }

    fn read_tip(&self) -> Result<Option<TipRecord>, StoreError> {
        Ok(self.inner.read().tip)
    }

    fn read_tx_status(&self, block_hash: &Hash256) -> Result<Option<TxStatus>, StoreError> {
        Ok(self.inner.read().tx_status.get(block_hash).cloned())
    }

    fn read_spent(&self, block_hash: &Hash256) -> Result<Option<Vec<Utxo>>, StoreError> {
        Ok(self.inner.read().spent.get(block_hash).cloned())
    }

    fn read_hash_at(&self, height: u64) -> Result<Option<Hash256>, StoreError> {
        Ok(self.inner.read().heights.get(&height).copied())
    }

    fn batch_write_utxo_delta(&self, delta: &UtxoDelta) -> Result<(), StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected commit failure".into()));
        }
        let mut inner = self.inner.write();
        for utxo in &delta.spent {
            inner.utxos.remove(&utxo.output_id);
        }
        for utxo in &delta.created {
            inner.utxos.insert(utxo.output_id, utxo.clone());
        }
        inner.tx_status.insert(delta.block_hash, delta.tx_status.clone());
        inner.spent.insert(delta.block_hash, delta.spent.clone());
        inner.heights.insert(delta.tip.height, delta.block_hash);
        inner.tip = Some(delta.tip);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NATIVE_ASSET;
    use crate::types::TxOutput;

    fn utxo(tag: u8) -> Utxo {
        Utxo::from_output(Hash256([tag; 32]), 0, &TxOutput::new(NATIVE_ASSET, 5, vec![0x51]), 1, false)
    }

    fn delta(spent: Vec<Utxo>, created: Vec<Utxo>) -> UtxoDelta {
        UtxoDelta {
            block_hash: Hash256([9; 32]),
            spent,
            created,
            tx_status: TxStatus::with_len(1),
            tip: TipRecord {
                hash: Hash256([9; 32]),
                height: 1,
            },
        }
    }

    #[test]
    fn empty_store_has_no_tip() {
        let store = MemoryStore::new();
        assert_eq!(store.read_tip().unwrap(), None);
        assert_eq!(store.utxo_count(), 0);
    }

    #[test]
    fn delta_applies_spends_creates_and_tip() {
        let store = MemoryStore::new();
        let old = utxo(1);
        store.seed_utxo(old.clone());
        let new = utxo(2);

        store.batch_write_utxo_delta(&delta(vec![old.clone()], vec![new.clone()])).unwrap();

        assert!(!store.contains_utxo(&old.output_id).unwrap());
        assert_eq!(store.read_utxo(&new.output_id).unwrap(), Some(new));
        assert_eq!(store.read_tip().unwrap().map(|t| t.height), Some(1));
        assert!(store.read_tx_status(&Hash256([9; 32])).unwrap().is_some());
        assert_eq!(store.read_spent(&Hash256([9; 32])).unwrap(), Some(vec![old]));
        assert_eq!(store.read_hash_at(1).unwrap(), Some(Hash256([9; 32])));
        assert_eq!(store.read_hash_at(2).unwrap(), None);
    }

    #[test]
    fn failed_commit_changes_nothing() {
        let store = MemoryStore::new();
        let old = utxo(1);
        store.seed_utxo(old.clone());
        store.fail_commits(true);

        assert!(store.batch_write_utxo_delta(&delta(vec![old.clone()], vec![utxo(2)])).is_err());
        assert!(store.contains_utxo(&old.output_id).unwrap());
        assert_eq!(store.utxo_count(), 1);
        assert_eq!(store.read_tip().unwrap(), None);
        assert_eq!(store.read_hash_at(1).unwrap(), None);

        store.fail_commits(false);
        assert!(store.batch_write_utxo_delta(&delta(vec![], vec![])).is_ok());
    }
}
