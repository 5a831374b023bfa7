//! Genesis block construction.
//!
//! The genesis block sits at height 0 with a zero parent hash and holds a
//! single coinbase transaction issuing [`GENESIS_ISSUANCE`] of the native
//! asset. It is fully determined by its [`GenesisParams`], so every node
//! computes the same block and the same hash.

use serde::{Deserialize, Serialize};

use crate::constants::{BLOCK_VERSION, GENESIS_ISSUANCE, NATIVE_ASSET, NetworkType, TX_VERSION};
use crate::error::BlockError;
use crate::merkle;
use crate::program;
use crate::types::{Block, BlockHeader, Hash256, Transaction, TxInput, TxOutput, TxStatus};

/// Mainnet genesis timestamp: 2018-04-24 06:00:00 UTC.
pub const MAINNET_GENESIS_TIMESTAMP: u64 = 1_524_549_600;
/// Testnet and regtest genesis timestamp: 2018-06-14 02:43:20 UTC.
pub const TESTNET_GENESIS_TIMESTAMP: u64 = 1_528_944_200;

pub const GENESIS_MESSAGE: &[u8] = b"tessera genesis: every asset, one ledger";

/// Inputs to [`build_genesis`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisParams {
    pub network: NetworkType,
    pub timestamp: u64,
    pub bits: u64,
    /// Native units minted by the genesis coinbase.
    pub issuance: u64,
    /// Control program guarding the issued output.
    pub program: Vec<u8>,
    /// Carried in the coinbase input's arbitrary data.
    pub message: Vec<u8>,
}

impl GenesisParams {
    pub fn for_network(network: NetworkType) -> Self {
        let (timestamp, program) = match network {
            NetworkType::Mainnet => (MAINNET_GENESIS_TIMESTAMP, issuance_program()),
            NetworkType::Testnet => (TESTNET_GENESIS_TIMESTAMP, issuance_program()),
            NetworkType::Regtest => (TESTNET_GENESIS_TIMESTAMP, program::anyone_can_spend()),
        };
        Self {
            network,
            timestamp,
            bits: network.initial_bits(),
            issuance: GENESIS_ISSUANCE,
            program,
            message: GENESIS_MESSAGE.to_vec(),
        }
    }
}

/// Program guarding the public networks' genesis issuance.
///
/// A zero type byte followed by `BLAKE3("tessera genesis issuance")`. No
/// predicate accepts the zero type, so the output is provably unspendable.
pub fn issuance_program() -> Vec<u8> {
    let mut program = vec![0x00];
    program.extend_from_slice(blake3::hash(b"tessera genesis issuance").as_bytes());
    program
}

/// Build the genesis block described by `params`.
pub fn build_genesis(params: &GenesisParams) -> Block {
    let coinbase = Transaction {
        version: TX_VERSION,
        time_range: 0,
        inputs: vec![TxInput::Coinbase {
            arbitrary: params.message.clone(),
        }],
        outputs: vec![TxOutput::new(NATIVE_ASSET, params.issuance, params.program.clone())],
    };
    let merkle_root = merkle::merkle_root(&[coinbase.id()]);
    Block {
        header: BlockHeader {
            version: BLOCK_VERSION,
            height: 0,
            prev_hash: Hash256::ZERO,
            timestamp: params.timestamp,
            tx_status: TxStatus::with_len(1),
            merkle_root,
            bits: params.bits,
            nonce: 0,
        },
        transactions: vec![coinbase],
    }
}

/// Structural checks for a block offered as genesis.
///
/// Genesis has no parent and no work requirement; it is trusted by hash,
/// so these checks only guard against a mislabelled block.
pub fn validate_genesis(block: &Block, params: &GenesisParams) -> Result<(), BlockError> {
    let header = &block.header;
    if header.height != 0 {
        return Err(BlockError::HeightMismatch {
            expected: 0,
            got: header.height,
        });
    }
    if !header.prev_hash.is_zero() {
        return Err(BlockError::ParentMismatch {
            expected: Hash256::ZERO,
            got: header.prev_hash,
        });
    }
    let computed = merkle::merkle_root(&block.tx_ids());
    if computed != header.merkle_root {
        return Err(BlockError::MerkleMismatch {
            header: header.merkle_root,
            computed,
        });
    }
    let [coinbase] = block.transactions.as_slice() else {
        return Err(BlockError::Genesis(format!(
            "expected one transaction, found {}",
            block.transactions.len()
        )));
    };
    if !coinbase.is_coinbase() {
        return Err(BlockError::Genesis("transaction is not a coinbase".into()));
    }
    let issued = coinbase.total_output(&NATIVE_ASSET);
    if issued != Some(params.issuance) || coinbase.outputs.iter().any(|o| o.asset_id != NATIVE_ASSET) {
        return Err(BlockError::Genesis(format!(
            "issuance {issued:?} differs from {}",
            params.issuance
        )));
    }
    Ok(())
}
