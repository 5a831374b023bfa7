//! RocksDB-backed chain storage.
//!
//! Implements [`Store`] with one column family per record kind: blocks,
//! headers, UTXOs, transaction status, height index, undo data (the UTXOs
//! each block spent) and metadata. Values are bincode
//! encoded. [`Store::batch_write_utxo_delta`] is a single [`WriteBatch`],
//! so a crash leaves either the previous tip or the new one, never a mix.

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use tracing::debug;

use tessera_core::error::StoreError;
use tessera_core::store::{Store, TipRecord, UtxoDelta};
use tessera_core::types::{Block, BlockHeader, Hash256, TxStatus, Utxo};

// --- Column family names ---

const CF_BLOCKS: &str = "blocks";
const CF_HEADERS: &str = "headers";
const CF_UTXOS: &str = "utxos";
const CF_TX_STATUS: &str = "tx_status";
const CF_HEIGHT_INDEX: &str = "height_index";
const CF_UNDO: &str = "undo";
const CF_METADATA: &str = "metadata";

const ALL_CFS: &[&str] = &[
    CF_BLOCKS,
    CF_HEADERS,
    CF_UTXOS,
    CF_TX_STATUS,
    CF_HEIGHT_INDEX,
    CF_UNDO,
    CF_METADATA,
];

// --- Metadata keys ---

const META_TIP: &[u8] = b"tip";

/// Big-endian so the height index iterates in chain order.
fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

fn backend(e: rocksdb::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::encode_to_vec(value, bincode::config::standard()).map_err(|e| StoreError::Encode(e.to_string()))
}

fn decode<T: bincode::Decode<()>>(what: &'static str, bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard()).map_err(|e| StoreError::Decode {
        what,
        reason: e.to_string(),
    })?;
    Ok(value)
}

/// Persistent [`Store`] on RocksDB.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a database at `path`, creating missing column families.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors).map_err(backend)?;
        debug!(path = %path.as_ref().display(), "opened rocksdb store");
        Ok(Self { db })
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(backend)
    }

    /// Number of stored UTXOs. Walks the whole column family.
    pub fn utxo_count(&self) -> Result<usize, StoreError> {
        let cf = self.cf_handle(CF_UTXOS)?;
        let mut count = 0;
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            item.map_err(backend)?;
            count += 1;
        }
        Ok(count)
    }

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family: {name}")))
    }

    fn get<T: bincode::Decode<()>>(&self, cf: &str, what: &'static str, key: &[u8]) -> Result<Option<T>, StoreError> {
        let cf = self.cf_handle(cf)?;
        match self.db.get_cf(cf, key).map_err(backend)? {
            Some(bytes) => Ok(Some(decode(what, &bytes)?)),
            None => Ok(None),
        }
    }
}

impl Store for RocksStore {
    fn read_block_header(&self, hash: &Hash256) -> Result<Option<BlockHeader>, StoreError> {
        self.get(CF_HEADERS, "block header", hash.as_bytes())
    }

    fn read_block(&self, hash: &Hash256) -> Result<Option<Block>, StoreError> {
        self.get(CF_BLOCKS, "block", hash.as_bytes())
    }

    fn write_block(&self, hash: &Hash256, block: &Block) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf_handle(CF_HEADERS)?, hash.as_bytes(), encode(&block.header)?);
        batch.put_cf(self.cf_handle(CF_BLOCKS)?, hash.as_bytes(), encode(block)?);
        self.db.write(batch).map_err(backend)
    }

    fn read_utxo(&self, output_id: &Hash256) -> Result<Option<Utxo>, StoreError> {
        self.get(CF_UTXOS, "utxo", output_id.as_bytes())
    }

    fn read_tip(&self) -> Result<Option<TipRecord>, StoreError> {
        self.get(CF_METADATA, "tip", META_TIP)
    }

    fn read_tx_status(&self, block_hash: &Hash256) -> Result<Option<TxStatus>, StoreError> {
        self.get(CF_TX_STATUS, "tx status", block_hash.as_bytes())
    }

    fn read_spent(&self, block_hash: &Hash256) -> Result<Option<Vec<Utxo>>, StoreError> {
        self.get(CF_UNDO, "undo data", block_hash.as_bytes())
    }

    fn read_hash_at(&self, height: u64) -> Result<Option<Hash256>, StoreError> {
        self.get(CF_HEIGHT_INDEX, "height index", &height_key(height))
    }

    fn batch_write_utxo_delta(&self, delta: &UtxoDelta) -> Result<(), StoreError> {
        let cf_utxos = self.cf_handle(CF_UTXOS)?;
        let mut batch = WriteBatch::default();
        for utxo in &delta.spent {
            batch.delete_cf(cf_utxos, utxo.output_id.as_bytes());
        }
        for utxo in &delta.created {
            batch.put_cf(cf_utxos, utxo.output_id.as_bytes(), encode(utxo)?);
        }
        batch.put_cf(self.cf_handle(CF_TX_STATUS)?, delta.block_hash.as_bytes(), encode(&delta.tx_status)?);
        batch.put_cf(self.cf_handle(CF_UNDO)?, delta.block_hash.as_bytes(), encode(&delta.spent)?);
        batch.put_cf(self.cf_handle(CF_HEIGHT_INDEX)?, height_key(delta.tip.height), encode(&delta.block_hash)?);
        batch.put_cf(self.cf_handle(CF_METADATA)?, META_TIP, encode(&delta.tip)?);
        self.db.write(batch).map_err(backend)?;
        debug!(
            height = delta.tip.height,
            hash = %delta.tip.hash,
            spent = delta.spent.len(),
            created = delta.created.len(),
            "committed utxo delta"
        );
        Ok(())
    }

    fn contains_utxo(&self, output_id: &Hash256) -> Result<bool, StoreError> {
        let cf = self.cf_handle(CF_UTXOS)?;
        Ok(self.db.get_pinned_cf(cf, output_id.as_bytes()).map_err(backend)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::constants::NATIVE_ASSET;
    use tessera_core::types::TxOutput;

    fn temp_store() -> (RocksStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path().join("chaindata")).unwrap();
        (store, dir)
    }

    #[test]
    fn fresh_store_is_empty() {
        let (store, _dir) = temp_store();
        assert_eq!(store.read_tip().unwrap(), None);
        assert_eq!(store.utxo_count().unwrap(), 0);
        assert_eq!(store.read_utxo(&Hash256::ZERO).unwrap(), None);
    }

    #[test]
    fn corrupt_value_reports_decode_error() {
        let (store, _dir) = temp_store();
        let cf = store.cf_handle(CF_METADATA).unwrap();
        store.db.put_cf(cf, META_TIP, [0xFF]).unwrap();
        assert!(matches!(store.read_tip(), Err(StoreError::Decode { what: "tip", .. })));
    }

    #[test]
    fn contains_utxo_matches_read() {
        let (store, _dir) = temp_store();
        let utxo = Utxo::from_output(Hash256([3; 32]), 0, &TxOutput::new(NATIVE_ASSET, 9, vec![0x51]), 1, false);
        let delta = UtxoDelta {
            block_hash: Hash256([1; 32]),
            spent: vec![],
            created: vec![utxo.clone()],
            tx_status: TxStatus::with_len(1),
            tip: TipRecord {
                hash: Hash256([1; 32]),
                height: 1,
            },
        };
        store.batch_write_utxo_delta(&delta).unwrap();
        assert!(store.contains_utxo(&utxo.output_id).unwrap());
        assert!(!store.contains_utxo(&Hash256([4; 32])).unwrap());
    }

    #[test]
    fn delta_records_undo_data_and_height() {
        let (store, _dir) = temp_store();
        let old = Utxo::from_output(Hash256([5; 32]), 0, &TxOutput::new(NATIVE_ASSET, 9, vec![0x51]), 0, false);
        let delta = UtxoDelta {
            block_hash: Hash256([2; 32]),
            spent: vec![old.clone()],
            created: vec![],
            tx_status: TxStatus::with_len(2),
            tip: TipRecord {
                hash: Hash256([2; 32]),
                height: 3,
            },
        };
        store.batch_write_utxo_delta(&delta).unwrap();
        assert_eq!(store.read_spent(&Hash256([2; 32])).unwrap(), Some(vec![old]));
        assert_eq!(store.read_hash_at(3).unwrap(), Some(Hash256([2; 32])));
        assert_eq!(store.read_hash_at(4).unwrap(), None);
        assert_eq!(store.read_spent(&Hash256([7; 32])).unwrap(), None);
    }
}
