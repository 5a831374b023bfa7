//! Trait seams between the chain and its collaborators.
//!
//! - [`ProofOfWork`]: decides whether a header carries enough work.
//! - [`SpendPredicate`]: evaluates control programs against witnesses.
//! - [`TxPool`]: staging area for loose transactions.
//! - [`BlockListener`]: receives block-attached notifications.
//!
//! The persistent store seam lives in [`store`](crate::store).

use std::sync::Arc;

use crate::error::{MempoolError, ProgramError};
use crate::types::{Block, BlockHeader, Hash256, Transaction, Utxo};

/// Pluggable proof-of-work predicate.
pub trait ProofOfWork: Send + Sync {
    /// Whether `header` satisfies its own `bits`.
    fn check(&self, header: &BlockHeader) -> bool;
}

/// Evaluator for output control programs.
pub trait SpendPredicate: Send + Sync {
    /// Check that `arguments` satisfy `program` for a spend committing to
    /// `sig_hash`.
    fn check(&self, program: &[u8], sig_hash: &Hash256, arguments: &[Vec<u8>]) -> Result<(), ProgramError>;
}

/// Staging area for transactions waiting to be mined.
///
/// No durability is required; a restarted node starts with an empty pool.
pub trait TxPool: Send + Sync {
    /// Stage `tx`. Returns `Ok(false)` if it is already staged.
    fn add(&self, tx: Transaction) -> Result<bool, MempoolError>;

    fn lookup(&self, id: &Hash256) -> Option<Transaction>;

    /// Remove a staged transaction by ID.
    fn remove(&self, id: &Hash256) -> Option<Transaction>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything made obsolete by `block`.
    ///
    /// The default only removes transactions the block includes. Pools that
    /// index spends should also drop entries conflicting with the block.
    fn remove_confirmed(&self, block: &Block) {
        for tx in &block.transactions {
            self.remove(&tx.id());
        }
    }
}

/// Notification emitted after a block has been committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockAttached {
    pub block: Arc<Block>,
    pub hash: Hash256,
    pub height: u64,
    /// UTXOs removed by the block, as they were before the spend.
    pub spent: Vec<Utxo>,
    /// UTXOs added by the block.
    pub created: Vec<Utxo>,
}

impl BlockAttached {
    /// Transactions other than the coinbase.
    pub fn non_coinbase_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.block.transactions.iter().filter(|tx| !tx.is_coinbase())
    }
}

/// Consumer of block-attached notifications.
///
/// Delivery is at-least-once: a listener may see the same block again after a
/// restart and must key its work by block hash or height.
pub trait BlockListener: Send + Sync {
    fn on_block_attached(&self, event: &BlockAttached);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NATIVE_ASSET;
    use crate::types::{BlockHeader, TxInput, TxOutput, TxStatus};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    // ------------------------------------------------------------------
    // Mock: TxPool relying on the default remove_confirmed
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct MapPool {
        txs: Mutex<HashMap<Hash256, Transaction>>,
    }

    impl TxPool for MapPool {
        fn add(&self, tx: Transaction) -> Result<bool, MempoolError> {
            Ok(self.txs.lock().insert(tx.id(), tx).is_none())
        }

        fn lookup(&self, id: &Hash256) -> Option<Transaction> {
            self.txs.lock().get(id).cloned()
        }

        fn remove(&self, id: &Hash256) -> Option<Transaction> {
            self.txs.lock().remove(id)
        }

        fn len(&self) -> usize {
            self.txs.lock().len()
        }
    }

    fn tx(tag: u8) -> Transaction {
        Transaction {
            version: 1,
            time_range: 0,
            inputs: vec![TxInput::Coinbase { arbitrary: vec![tag] }],
            outputs: vec![TxOutput::new(NATIVE_ASSET, 1, vec![0x51])],
        }
    }

    fn block(txs: Vec<Transaction>) -> Block {
        Block {
            header: BlockHeader {
                version: 1,
                height: 1,
                prev_hash: Hash256::ZERO,
                timestamp: 0,
                tx_status: TxStatus::with_len(txs.len()),
                merkle_root: Hash256::ZERO,
                bits: u64::MAX,
                nonce: 0,
            },
            transactions: txs,
        }
    }

    #[test]
    fn default_remove_confirmed_drops_included() {
        let pool = MapPool::default();
        assert!(pool.add(tx(1)).unwrap());
        assert!(!pool.add(tx(1)).unwrap());
        assert!(pool.add(tx(2)).unwrap());
        assert_eq!(pool.len(), 2);

        pool.remove_confirmed(&block(vec![tx(1)]));
        assert_eq!(pool.len(), 1);
        assert!(pool.lookup(&tx(1).id()).is_none());
        assert!(pool.lookup(&tx(2).id()).is_some());
    }

    #[test]
    fn is_empty_follows_len() {
        let pool = MapPool::default();
        assert!(pool.is_empty());
        pool.add(tx(3)).unwrap();
        assert!(!pool.is_empty());
    }

    #[test]
    fn block_attached_skips_coinbase() {
        let spend = Transaction {
            inputs: vec![],
            ..tx(9)
        };
        let b = Arc::new(block(vec![tx(1), spend.clone()]));
        let event = BlockAttached {
            hash: b.hash(),
            height: 1,
            block: b,
            spent: vec![],
            created: vec![],
        };
        let ids: Vec<Hash256> = event.non_coinbase_transactions().map(Transaction::id).collect();
        assert_eq!(ids, vec![spend.id()]);
    }
}
