//! RocksStore against the chain's storage contract.

use std::sync::Arc;

use tessera_core::chain::{Chain, ChainOptions};
use tessera_core::constants::NATIVE_ASSET;
use tessera_core::difficulty::{self, Sha256dWork};
use tessera_core::mempool::MemoryTxPool;
use tessera_core::merkle;
use tessera_core::params::ConsensusParams;
use tessera_core::program::anyone_can_spend;
use tessera_core::store::{Store, TipRecord, UtxoDelta};
use tessera_core::types::{
    Block, BlockHeader, Hash256, SpendInput, Transaction, TxInput, TxOutput, TxStatus, Utxo,
};
use tessera_node_lib::storage::RocksStore;

fn temp_store() -> (RocksStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(dir.path().join("chaindata")).unwrap();
    (store, dir)
}

fn utxo(tag: u8, amount: u64) -> Utxo {
    Utxo::from_output(Hash256([tag; 32]), 0, &TxOutput::new(NATIVE_ASSET, amount, anyone_can_spend()), 0, false)
}

fn delta(height: u64, spent: Vec<Utxo>, created: Vec<Utxo>) -> UtxoDelta {
    let hash = Hash256([height as u8 + 100; 32]);
    UtxoDelta {
        block_hash: hash,
        spent,
        created,
        tx_status: TxStatus::with_len(2),
        tip: TipRecord { hash, height },
    }
}

fn spend(u: &Utxo, outputs: &[u64]) -> Transaction {
    Transaction {
        version: 1,
        time_range: 0,
        inputs: vec![TxInput::Spend(SpendInput {
            output_id: u.output_id,
            source_id: u.source_id,
            source_position: u.source_position,
            asset_id: u.asset_id,
            amount: u.amount,
            control_program: u.control_program.clone(),
            arguments: vec![],
        })],
        outputs: outputs
            .iter()
            .map(|a| TxOutput::new(NATIVE_ASSET, *a, anyone_can_spend()))
            .collect(),
    }
}

fn child_block(chain: &Chain, txs: Vec<Transaction>) -> Block {
    let tip = chain.tip().unwrap();
    let height = tip.height + 1;
    let mut transactions = vec![Transaction {
        version: 1,
        time_range: 0,
        inputs: vec![TxInput::Coinbase { arbitrary: height.to_le_bytes().to_vec() }],
        outputs: vec![TxOutput::new(NATIVE_ASSET, chain.params().coinbase_amount(height), anyone_can_spend())],
    }];
    transactions.extend(txs);
    let ids: Vec<Hash256> = transactions.iter().map(Transaction::id).collect();
    let mut header = BlockHeader {
        version: 1,
        height,
        prev_hash: tip.hash,
        timestamp: tip.header.timestamp + 150,
        tx_status: TxStatus::with_len(transactions.len()),
        merkle_root: merkle::merkle_root(&ids),
        bits: chain.next_bits().unwrap(),
        nonce: 0,
    };
    assert!(difficulty::solve(&mut header, &Sha256dWork, 1_000_000));
    Block { header, transactions }
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

#[test]
fn write_block_is_idempotent() {
    let (store, _dir) = temp_store();
    let block = ConsensusParams::regtest().genesis_block();
    let hash = block.hash();

    store.write_block(&hash, &block).unwrap();
    store.write_block(&hash, &block).unwrap();

    assert_eq!(store.read_block(&hash).unwrap(), Some(block.clone()));
    assert_eq!(store.read_block_header(&hash).unwrap(), Some(block.header));
    assert_eq!(store.read_block(&Hash256([1; 32])).unwrap(), None);
}

#[test]
fn utxo_delta_applies_atomically() {
    let (store, _dir) = temp_store();
    let a = utxo(1, 10);
    let b = utxo(2, 20);
    store.batch_write_utxo_delta(&delta(1, vec![], vec![a.clone(), b.clone()])).unwrap();
    assert_eq!(store.utxo_count().unwrap(), 2);

    let c = utxo(3, 30);
    let second = delta(2, vec![a.clone()], vec![c.clone()]);
    store.batch_write_utxo_delta(&second).unwrap();

    assert_eq!(store.read_utxo(&a.output_id).unwrap(), None);
    assert_eq!(store.read_utxo(&b.output_id).unwrap(), Some(b));
    assert_eq!(store.read_utxo(&c.output_id).unwrap(), Some(c));
    assert_eq!(store.read_tip().unwrap(), Some(second.tip));
    assert_eq!(
        store.read_tx_status(&second.block_hash).unwrap(),
        Some(TxStatus::with_len(2))
    );
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chaindata");
    let u = utxo(7, 70);
    let d = delta(1, vec![], vec![u.clone()]);
    {
        let store = RocksStore::open(&path).unwrap();
        store.batch_write_utxo_delta(&d).unwrap();
        store.flush().unwrap();
    }
    let store = RocksStore::open(&path).unwrap();
    assert_eq!(store.read_tip().unwrap(), Some(d.tip));
    assert_eq!(store.read_utxo(&u.output_id).unwrap(), Some(u));
}

// ---------------------------------------------------------------------------
// Chain over RocksDB
// ---------------------------------------------------------------------------

#[test]
fn chain_spends_through_rocksdb() {
    let (store, _dir) = temp_store();
    let store = Arc::new(store);
    let params = ConsensusParams::regtest();
    let genesis = params.genesis_block();
    let chain = Chain::with_options(
        genesis.hash(),
        store.clone(),
        Arc::new(MemoryTxPool::default()),
        ChainOptions::new(params),
    )
    .unwrap();
    chain.connect_block(&genesis).unwrap();

    let first = child_block(&chain, vec![]);
    chain.connect_block(&first).unwrap();
    let reward = Utxo::from_output(first.transactions[0].id(), 0, &first.transactions[0].outputs[0], 1, true);
    assert_eq!(store.read_utxo(&reward.output_id).unwrap(), Some(reward.clone()));

    let tx = spend(&reward, &[reward.amount - 1, 1]);
    let second = child_block(&chain, vec![tx.clone()]);
    let result = chain.connect_block(&second).unwrap();
    assert_eq!(result.spent, 1);
    assert_eq!(result.created, 3);

    assert_eq!(store.read_utxo(&reward.output_id).unwrap(), None);
    for id in tx.output_ids() {
        assert!(store.contains_utxo(&id).unwrap());
    }
    assert_eq!(store.read_tip().unwrap().unwrap().height, 2);
}

#[test]
fn chain_reports_corrupt_tip() {
    let (store, _dir) = temp_store();
    store
        .batch_write_utxo_delta(&delta(5, vec![], vec![]))
        .unwrap();
    let err = Chain::new(Hash256::ZERO, Arc::new(store), Arc::new(MemoryTxPool::default())).err().unwrap();
    assert!(matches!(err, tessera_core::error::ChainError::StoreCorruption(_)));
}
