//! Block validation.
//!
//! [`validate_block`] is a pure function of the candidate block, its parent
//! header, a [`BlockContext`] and a UTXO lookup reflecting the parent state.
//! It mutates nothing. Checks run in a fixed order and the first failure is
//! returned:
//!
//! 1. height is the parent's plus one
//! 2. `prev_hash` is the parent's hash
//! 3. timestamp is after the parent's and within the future-drift bound
//! 4. the Merkle root matches the transactions
//! 5. `bits` equals the retarget schedule and the header satisfies it
//! 6. the first transaction is the only coinbase and mints exactly the subsidy
//! 7. per transaction: structure, inputs exist and are claimed once, inputs
//!    match their UTXOs, per-asset conservation, fresh output IDs, witnesses
//!
//! The genesis block has no parent and goes through
//! [`genesis::validate_genesis`](crate::genesis::validate_genesis) instead.

use std::collections::HashSet;

use crate::constants::{MAX_COINBASE_DATA, NATIVE_ASSET};
use crate::error::BlockError;
use crate::merkle;
use crate::params::ConsensusParams;
use crate::traits::{ProofOfWork, SpendPredicate};
use crate::types::{Block, BlockHeader, Hash256, TxInput, TxStatus, Utxo};
use crate::validation;

/// Chain-derived inputs to [`validate_block`].
pub struct BlockContext<'a> {
    pub parent: &'a BlockHeader,
    /// Hash of `parent`, passed in to avoid rehashing.
    pub parent_hash: Hash256,
    /// Bits the retarget schedule requires at the candidate's height.
    pub expected_bits: u64,
    /// Local clock in Unix seconds.
    pub now: u64,
    pub params: &'a ConsensusParams,
    pub work: &'a dyn ProofOfWork,
    pub predicate: &'a dyn SpendPredicate,
}

/// What connecting a validated block will change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBlock {
    pub hash: Hash256,
    pub height: u64,
    /// UTXOs consumed, in input order.
    pub spent: Vec<Utxo>,
    /// UTXOs produced, in transaction then position order.
    pub created: Vec<Utxo>,
    pub tx_status: TxStatus,
}

/// Run every consensus check on `block` against its parent.
///
/// `lookup` must answer from the UTXO set as of the parent. Outputs created
/// inside the candidate block are not visible to it, so a transaction
/// cannot spend an output of the same block.
pub fn validate_block<F>(block: &Block, ctx: &BlockContext<'_>, lookup: F) -> Result<ValidatedBlock, BlockError>
where
    F: Fn(&Hash256) -> Option<Utxo>,
{
    let header = &block.header;

    // --- 1. Height ---

    let expected_height = ctx.parent.height + 1;
    if header.height != expected_height {
        return Err(BlockError::HeightMismatch {
            expected: expected_height,
            got: header.height,
        });
    }

    // --- 2. Parent ---

    if header.prev_hash != ctx.parent_hash {
        return Err(BlockError::ParentMismatch {
            expected: ctx.parent_hash,
            got: header.prev_hash,
        });
    }

    // --- 3. Timestamp ---

    let max_time = ctx.now.saturating_add(ctx.params.max_future_drift);
    if header.timestamp <= ctx.parent.timestamp || header.timestamp > max_time {
        return Err(BlockError::Timestamp {
            got: header.timestamp,
            parent: ctx.parent.timestamp,
            max: max_time,
        });
    }

    // --- 4. Merkle commitment ---

    let computed = merkle::merkle_root(&block.tx_ids());
    if computed != header.merkle_root {
        return Err(BlockError::MerkleMismatch {
            header: header.merkle_root,
            computed,
        });
    }

    // --- 5. Proof of work ---

    if header.bits != ctx.expected_bits {
        return Err(BlockError::ProofOfWork(format!(
            "bits {} differ from scheduled {}",
            header.bits, ctx.expected_bits
        )));
    }
    if !ctx.work.check(header) {
        return Err(BlockError::ProofOfWork(format!("header does not satisfy bits {}", header.bits)));
    }

    // --- 6. Coinbase ---

    check_coinbase(block, ctx.params.coinbase_amount(header.height))?;

    // --- 7. Transactions ---

    let mut spent_in_block = HashSet::new();
    let mut created_in_block = HashSet::new();
    let mut spent = Vec::new();
    for (index, tx) in block.transactions.iter().enumerate() {
        let wrap = |source| BlockError::Transaction { index, source };
        validation::validate_structure(tx).map_err(wrap)?;
        validation::check_time_range(tx, header.timestamp).map_err(wrap)?;

        if !tx.is_coinbase() {
            spent.extend(validation::resolve_inputs(tx, index, &lookup, &mut spent_in_block)?);
            validation::check_conservation(tx, index)?;
        }
        validation::check_new_outputs(tx, |id| lookup(id).is_some(), &mut created_in_block)?;
        if !tx.is_coinbase() {
            validation::verify_witnesses(tx, index, ctx.predicate)?;
        }
    }

    Ok(ValidatedBlock {
        hash: header.hash(),
        height: header.height,
        spent,
        created: crate::utxo::created_utxos(block),
        tx_status: header.tx_status.clone(),
    })
}

/// The first transaction is the block's only coinbase and mints `amount`
/// of the native asset and nothing else.
///
/// Its arbitrary data must begin with the block height (u64 little-endian).
/// Two coinbases at different heights therefore never share a transaction
/// ID, which keeps output IDs unique across the whole chain: every other
/// transaction commits to the outputs it spends.
pub fn check_coinbase(block: &Block, amount: u64) -> Result<(), BlockError> {
    let Some(coinbase) = block.coinbase() else {
        return Err(BlockError::Coinbase("block has no transactions".into()));
    };
    let [TxInput::Coinbase { arbitrary }] = coinbase.inputs.as_slice() else {
        return Err(BlockError::Coinbase("first transaction is not a coinbase".into()));
    };
    if arbitrary.len() > MAX_COINBASE_DATA {
        return Err(BlockError::Coinbase(format!(
            "arbitrary data is {} bytes, limit {MAX_COINBASE_DATA}",
            arbitrary.len()
        )));
    }
    let height = block.header.height;
    if !arbitrary.starts_with(&height.to_le_bytes()) {
        return Err(BlockError::Coinbase(format!("arbitrary data does not commit to height {height}")));
    }
    if let Some(output) = coinbase.outputs.iter().find(|o| o.asset_id != NATIVE_ASSET) {
        return Err(BlockError::Coinbase(format!("mints non-native asset {}", output.asset_id)));
    }
    let minted = coinbase.total_output(&NATIVE_ASSET);
    if minted != Some(amount) {
        return Err(BlockError::Coinbase(format!("mints {minted:?}, schedule requires {amount}")));
    }
    if let Some(index) = block.transactions.iter().skip(1).position(|tx| tx.has_coinbase_input()) {
        return Err(BlockError::Coinbase(format!("transaction {} has a coinbase input", index + 1)));
    }
    Ok(())
}
