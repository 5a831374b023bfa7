//! Shared test helpers for end-to-end and property tests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::Mutex;

use tessera_core::chain::{Chain, ChainOptions};
use tessera_core::constants::NATIVE_ASSET;
use tessera_core::difficulty::{self, Sha256dWork};
use tessera_core::mempool::MemoryTxPool;
use tessera_core::merkle;
use tessera_core::params::ConsensusParams;
use tessera_core::program::anyone_can_spend;
use tessera_core::store::MemoryStore;
use tessera_core::traits::{BlockAttached, BlockListener};
use tessera_core::types::{Block, BlockHeader, Hash256, Transaction, TxInput, TxOutput, TxStatus, Utxo};
use tessera_wallet::{Account, AccountAddress, AccountManager, KeyRing, Template, TxBuilder, XPrv};

/// Fixed clock for deterministic timestamp checks.
pub const NOW: u64 = 1_900_000_000;

/// Records every notification it receives.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<BlockAttached>>,
}

impl BlockListener for Recorder {
    fn on_block_attached(&self, event: &BlockAttached) {
        self.events.lock().push(event.clone());
    }
}

/// A regtest chain on an in-memory store, genesis connected.
pub struct TestChain {
    pub chain: Chain,
    pub store: Arc<MemoryStore>,
    pub pool: Arc<MemoryTxPool>,
    pub params: ConsensusParams,
    pub recorder: Arc<Recorder>,
}

impl TestChain {
    pub fn regtest() -> Self {
        let params = ConsensusParams::regtest();
        let store = Arc::new(MemoryStore::new());
        let pool = Arc::new(MemoryTxPool::default());
        let options = ChainOptions::new(params.clone()).with_clock(Arc::new(|| NOW));
        let chain = Chain::with_options(params.genesis_hash(), store.clone(), pool.clone(), options).unwrap();
        chain.connect_block(&params.genesis_block()).unwrap();
        let recorder = Arc::new(Recorder::default());
        chain.subscribe(recorder.clone());
        Self {
            chain,
            store,
            pool,
            params,
            recorder,
        }
    }

    /// The block the chain currently extends.
    pub fn tip_block(&self) -> Block {
        let tip = self.chain.tip().unwrap();
        self.chain.get_block_by_hash(&tip.hash).unwrap()
    }

    /// A mined block on the tip carrying a correct coinbase and `txs`.
    pub fn next_block(&self, txs: Vec<Transaction>) -> Block {
        mine_block(&self.chain, anyone_can_spend(), txs)
    }
}

/// Mine a block on `chain`'s tip whose coinbase pays `reward_program`.
pub fn mine_block(chain: &Chain, reward_program: Vec<u8>, txs: Vec<Transaction>) -> Block {
    let tip = chain.tip().unwrap();
    let params = chain.params();
    let height = tip.height + 1;
    let mut transactions = vec![coinbase(height, params.coinbase_amount(height), reward_program)];
    transactions.extend(txs);
    let mut header = BlockHeader {
        version: 1,
        height,
        prev_hash: tip.hash,
        timestamp: tip.header.timestamp + params.target_block_time,
        tx_status: TxStatus::with_len(transactions.len()),
        merkle_root: merkle_root_of(&transactions),
        bits: chain.next_bits().unwrap(),
        nonce: 0,
    };
    assert!(difficulty::solve(&mut header, &Sha256dWork, 1_000_000));
    Block { header, transactions }
}

pub fn merkle_root_of(transactions: &[Transaction]) -> Hash256 {
    let ids: Vec<Hash256> = transactions.iter().map(Transaction::id).collect();
    merkle::merkle_root(&ids)
}

/// Coinbase minting `amount` at `height` to `program`.
pub fn coinbase(height: u64, amount: u64, program: Vec<u8>) -> Transaction {
    Transaction {
        version: 1,
        time_range: 0,
        inputs: vec![TxInput::Coinbase { arbitrary: height.to_le_bytes().to_vec() }],
        outputs: vec![TxOutput::new(NATIVE_ASSET, amount, program)],
    }
}

/// A confirmed-looking native UTXO locked by `program`.
pub fn mock_utxo(tag: u8, amount: u64, program: Vec<u8>) -> Utxo {
    Utxo::from_output(Hash256([tag; 32]), 0, &TxOutput::new(NATIVE_ASSET, amount, program), 0, false)
}

/// An `m`-of-`n` account with one address, plus a key ring holding the
/// first `held` root keys.
pub struct Wallet {
    pub accounts: AccountManager,
    pub account: Account,
    pub address: AccountAddress,
    pub roots: Vec<XPrv>,
    pub ring: KeyRing,
}

impl Wallet {
    pub fn new(m: usize, n: usize, held: usize) -> Self {
        let roots: Vec<XPrv> = (0..n).map(|_| XPrv::generate()).collect();
        let accounts = AccountManager::new();
        let account = accounts
            .create(roots.iter().map(XPrv::xpub).collect(), m, "e2e")
            .unwrap();
        let address = accounts.create_address(&account.id, false).unwrap();
        let mut ring = KeyRing::new();
        for root in roots.iter().take(held) {
            ring.insert(root.clone());
        }
        Self {
            accounts,
            account,
            address,
            roots,
            ring,
        }
    }

    /// Template spending `utxo` into `outputs`, all to this wallet's address.
    pub fn pay_self(&self, utxo: &Utxo, outputs: &[u64]) -> Template {
        let (input, instruction) = self.accounts.utxo_to_inputs(&self.account.id, utxo).unwrap();
        let mut builder = TxBuilder::new(Utc::now() + Duration::minutes(5));
        builder.add_input(input, instruction);
        for amount in outputs {
            builder.add_output(TxOutput::new(NATIVE_ASSET, *amount, self.address.control_program.clone()));
        }
        builder.build().unwrap()
    }
}
