//! In-memory transaction pool.
//!
//! [`MemoryTxPool`] stages loose transactions until a block includes them.
//! It indexes staged spends by output ID so conflicts are caught on entry,
//! and evicts both confirmed transactions and those conflicting with a
//! connected block. Validation against the UTXO set is the caller's job
//! ([`Chain::accept_transaction`](crate::chain::Chain::accept_transaction)).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::MempoolError;
use crate::traits::TxPool;
use crate::types::{Block, Hash256, Transaction, TxInput};

/// Default maximum number of staged transactions.
pub const DEFAULT_MAX_COUNT: usize = 5_000;

struct Entry {
    tx: Transaction,
    seq: u64,
}

#[derive(Default)]
struct PoolInner {
    entries: HashMap<Hash256, Entry>,
    /// Spent output ID -> ID of the staged transaction spending it.
    by_output: HashMap<Hash256, Hash256>,
    next_seq: u64,
}

impl PoolInner {
    fn remove(&mut self, id: &Hash256) -> Option<Transaction> {
        let entry = self.entries.remove(id)?;
        for spent in entry.tx.inputs.iter().filter_map(TxInput::spent_output_id) {
            self.by_output.remove(spent);
        }
        Some(entry.tx)
    }
}

/// Capacity-bounded [`TxPool`].
pub struct MemoryTxPool {
    inner: Mutex<PoolInner>,
    max_count: usize,
}

impl MemoryTxPool {
    pub fn new(max_count: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            max_count,
        }
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Staged transactions in arrival order, at most `limit` of them.
    pub fn select(&self, limit: usize) -> Vec<Transaction> {
        let inner = self.inner.lock();
        let mut entries: Vec<&Entry> = inner.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().take(limit).map(|e| e.tx.clone()).collect()
    }

    /// ID of the staged transaction spending `output_id`, if any.
    pub fn spender_of(&self, output_id: &Hash256) -> Option<Hash256> {
        self.inner.lock().by_output.get(output_id).copied()
    }
}

impl Default for MemoryTxPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_COUNT)
    }
}

impl TxPool for MemoryTxPool {
    fn add(&self, tx: Transaction) -> Result<bool, MempoolError> {
        if tx.has_coinbase_input() {
            return Err(MempoolError::Coinbase);
        }
        let id = tx.id();
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&id) {
            return Ok(false);
        }
        for output_id in tx.inputs.iter().filter_map(TxInput::spent_output_id) {
            if let Some(existing) = inner.by_output.get(output_id) {
                return Err(MempoolError::Conflict {
                    existing: *existing,
                    output_id: *output_id,
                });
            }
        }
        if inner.entries.len() >= self.max_count {
            return Err(MempoolError::PoolFull);
        }
        for output_id in tx.inputs.iter().filter_map(TxInput::spent_output_id) {
            inner.by_output.insert(*output_id, id);
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(id, Entry { tx, seq });
        Ok(true)
    }

    fn lookup(&self, id: &Hash256) -> Option<Transaction> {
        self.inner.lock().entries.get(id).map(|e| e.tx.clone())
    }

    fn remove(&self, id: &Hash256) -> Option<Transaction> {
        self.inner.lock().remove(id)
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn remove_confirmed(&self, block: &Block) {
        let mut inner = self.inner.lock();
        for tx in &block.transactions {
            inner.remove(&tx.id());
            for output_id in tx.inputs.iter().filter_map(TxInput::spent_output_id) {
                if let Some(conflicting) = inner.by_output.get(output_id).copied() {
                    inner.remove(&conflicting);
                }
            }
        }
    }
}
