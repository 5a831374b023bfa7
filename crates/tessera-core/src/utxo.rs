//! UTXO snapshots and block deltas.
//!
//! Block validation is a pure function over a lookup closure. The chain
//! prefetches every output a candidate block touches into a
//! [`UtxoSnapshot`] and validates against that, so validation performs no
//! store I/O of its own and sees one consistent parent state.

use std::collections::HashMap;

use crate::error::StoreError;
use crate::store::{Store, TipRecord, UtxoDelta};
use crate::types::{Block, Hash256, TxInput, Utxo};

/// Output IDs a block reads: every spent output followed by every output it
/// would create.
pub fn referenced_output_ids(block: &Block) -> Vec<Hash256> {
    let mut ids: Vec<Hash256> = block
        .transactions
        .iter()
        .flat_map(|tx| tx.inputs.iter().filter_map(TxInput::spent_output_id).copied())
        .collect();
    for tx in &block.transactions {
        ids.extend(tx.output_ids());
    }
    ids
}

/// Materialize every output of `block` as a UTXO at the block's height.
pub fn created_utxos(block: &Block) -> Vec<Utxo> {
    let height = block.height();
    block
        .transactions
        .iter()
        .flat_map(|tx| {
            let id = tx.id();
            let is_coinbase = tx.is_coinbase();
            tx.outputs
                .iter()
                .enumerate()
                .map(move |(pos, output)| Utxo::from_output(id, pos as u64, output, height, is_coinbase))
        })
        .collect()
}

/// Point-in-time copy of the UTXOs relevant to one validation.
#[derive(Debug, Clone, Default)]
pub struct UtxoSnapshot {
    entries: HashMap<Hash256, Utxo>,
}

impl UtxoSnapshot {
    /// Read each of `ids` from `store`. Unknown IDs are simply absent.
    pub fn load<I>(store: &dyn Store, ids: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = Hash256>,
    {
        let mut entries = HashMap::new();
        for id in ids {
            if entries.contains_key(&id) {
                continue;
            }
            if let Some(utxo) = store.read_utxo(&id)? {
                entries.insert(id, utxo);
            }
        }
        Ok(Self { entries })
    }

    /// Snapshot of everything `block` touches.
    pub fn for_block(store: &dyn Store, block: &Block) -> Result<Self, StoreError> {
        Self::load(store, referenced_output_ids(block))
    }

    pub fn get(&self, id: &Hash256) -> Option<&Utxo> {
        self.entries.get(id)
    }

    /// Owned lookup in the shape validation expects.
    pub fn lookup(&self, id: &Hash256) -> Option<Utxo> {
        self.entries.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Utxo> for UtxoSnapshot {
    fn from_iter<T: IntoIterator<Item = Utxo>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|u| (u.output_id, u)).collect(),
        }
    }
}

/// Build the delta that connects `block`, given the UTXOs it spends and
/// creates.
pub fn block_delta(block: &Block, spent: &[Utxo], created: &[Utxo]) -> UtxoDelta {
    let hash = block.hash();
    UtxoDelta {
        block_hash: hash,
        spent: spent.to_vec(),
        created: created.to_vec(),
        tx_status: block.header.tx_status.clone(),
        tip: TipRecord {
            hash,
            height: block.height(),
        },
    }
}
