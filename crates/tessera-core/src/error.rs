//! Error types for the Tessera ledger core.
use thiserror::Error;

use crate::types::{AssetId, Hash256};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("too many inputs: {0}")] TooManyInputs(usize),
    #[error("too many outputs: {0}")] TooManyOutputs(usize),
    #[error("zero-amount output at index {0}")] ZeroAmountOutput(usize),
    #[error("value overflow")] ValueOverflow,
    #[error("expired: time range {time_range} < block time {timestamp}")] Expired { time_range: u64, timestamp: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("empty control program")] Empty,
    #[error("unknown program type: {0:#04x}")] UnknownType(u8),
    #[error("malformed program: {0}")] Malformed(String),
    #[error("invalid quorum {quorum} for {keys} keys")] InvalidQuorum { quorum: usize, keys: usize },
    #[error("invalid public key at position {0}")] InvalidPublicKey(usize),
    #[error("malformed witness argument {0}")] MalformedArgument(usize),
    #[error("not enough valid signatures: have {have}, need {need}")] Unsatisfied { have: usize, need: usize },
}

/// Block validation failures.
///
/// The first seven variants correspond one-to-one to the ordered checks in
/// [`validate_block`](crate::block_validation::validate_block).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("height mismatch: expected {expected}, got {got}")] HeightMismatch { expected: u64, got: u64 },
    #[error("parent mismatch: expected {expected}, got {got}")] ParentMismatch { expected: Hash256, got: Hash256 },
    #[error("timestamp {got} outside ({parent}, {max}]")] Timestamp { got: u64, parent: u64, max: u64 },
    #[error("merkle root mismatch: header {header}, computed {computed}")] MerkleMismatch { header: Hash256, computed: Hash256 },
    #[error("proof of work: {0}")] ProofOfWork(String),
    #[error("invalid coinbase: {0}")] Coinbase(String),
    #[error("double spend of {output_id} (in_block: {in_block})")] DoubleSpend { output_id: Hash256, in_block: bool },
    #[error("conservation violated in tx {tx} for asset {asset}: inputs {inputs}, outputs {outputs}")] Conservation { tx: usize, asset: AssetId, inputs: u128, outputs: u128 },
    #[error("input {input} of tx {tx} does not match the referenced output")] InputMismatch { tx: usize, input: usize },
    #[error("output {0} already exists")] DuplicateOutput(Hash256),
    #[error("witness for input {input} of tx {tx}: {source}")] Witness { tx: usize, input: usize, source: ProgramError },
    #[error("tx error in {index}: {source}")] Transaction { index: usize, source: TransactionError },
    #[error("genesis: {0}")] Genesis(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend: {0}")] Backend(String),
    #[error("decode {what}: {reason}")] Decode { what: &'static str, reason: String },
    #[error("encode: {0}")] Encode(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("conflicts with pool tx {existing} on output {output_id}")] Conflict { existing: Hash256, output_id: Hash256 },
    #[error("coinbase transactions are not poolable")] Coinbase,
    #[error("pool full")] PoolFull,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Mempool(#[from] MempoolError),
    #[error("block parent {parent} is not the current tip {tip}")] NotCurrentTip { tip: Hash256, parent: Hash256 },
    #[error("not found: {0}")] NotFound(Hash256),
    #[error("store corruption: {0}")] StoreCorruption(String),
    #[error("chain has no tip")] Uninitialized,
    #[error("atomic commit failed, restart from last committed tip: {0}")] CommitFailed(StoreError),
}
