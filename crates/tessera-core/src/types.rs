//! Core ledger types: hashes, transactions, blocks, UTXOs.
//!
//! Identifiers are content addresses. Every hash in this module is computed
//! over an explicit little-endian byte layout, never over a serde or bincode
//! encoding, so that independent implementations agree bit for bit.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte hash value.
///
/// Used for transaction IDs and output IDs (BLAKE3), block header hashes
/// (double SHA-256), and merkle roots (BLAKE3).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Used as the parent of the genesis block.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Identifier of an asset carried by outputs.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AssetId(pub Hash256);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

const OUTPUT_ID_DOMAIN: &[u8] = b"tessera/output";
const SIGHASH_DOMAIN: &[u8] = b"tessera/sighash";

/// Derive the ID of the output at `position` of transaction `source_id`.
pub fn output_id(source_id: &Hash256, position: u64) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(OUTPUT_ID_DOMAIN);
    hasher.update(source_id.as_bytes());
    hasher.update(&position.to_le_bytes());
    Hash256(hasher.finalize().into())
}

/// Spend of an existing output.
///
/// Carries a copy of the referenced output's fields so that signers can
/// commit to exactly what they consume. `arguments` is the witness that
/// satisfies the output's control program and is excluded from the
/// transaction ID.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SpendInput {
    pub output_id: Hash256,
    pub source_id: Hash256,
    pub source_position: u64,
    pub asset_id: AssetId,
    pub amount: u64,
    pub control_program: Vec<u8>,
    pub arguments: Vec<Vec<u8>>,
}

/// A transaction input. Validation dispatches on the variant.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub enum TxInput {
    Spend(SpendInput),
    /// Minting input of a coinbase transaction.
    Coinbase { arbitrary: Vec<u8> },
}

impl TxInput {
    /// The output consumed by this input, if it spends one.
    pub fn spent_output_id(&self) -> Option<&Hash256> {
        match self {
            Self::Spend(spend) => Some(&spend.output_id),
            Self::Coinbase { .. } => None,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self, Self::Coinbase { .. })
    }
}

/// A transaction output, creating a new UTXO when confirmed.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    pub asset_id: AssetId,
    pub amount: u64,
    pub control_program: Vec<u8>,
    pub state_data: Option<Vec<u8>>,
}

impl TxOutput {
    /// Output without state data.
    pub fn new(asset_id: AssetId, amount: u64, control_program: Vec<u8>) -> Self {
        Self {
            asset_id,
            amount,
            control_program,
            state_data: None,
        }
    }
}

/// A transaction moving assets between control programs.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Protocol version.
    pub version: u64,
    /// Latest block timestamp this transaction may be confirmed at. 0 = unbounded.
    pub time_range: u64,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TxInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Compute the transaction ID.
    ///
    /// BLAKE3 over the canonical encoding of everything except witness
    /// arguments, so signing a transaction never changes its ID.
    pub fn id(&self) -> Hash256 {
        let mut buf = Vec::with_capacity(128 + 96 * (self.inputs.len() + self.outputs.len()));
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.time_range.to_le_bytes());
        put_len(&mut buf, self.inputs.len());
        for input in &self.inputs {
            match input {
                TxInput::Spend(spend) => {
                    buf.push(0x01);
                    buf.extend_from_slice(spend.output_id.as_bytes());
                    buf.extend_from_slice(spend.source_id.as_bytes());
                    buf.extend_from_slice(&spend.source_position.to_le_bytes());
                    buf.extend_from_slice(spend.asset_id.0.as_bytes());
                    buf.extend_from_slice(&spend.amount.to_le_bytes());
                    put_bytes(&mut buf, &spend.control_program);
                }
                TxInput::Coinbase { arbitrary } => {
                    buf.push(0x02);
                    put_bytes(&mut buf, arbitrary);
                }
            }
        }
        put_len(&mut buf, self.outputs.len());
        for output in &self.outputs {
            buf.extend_from_slice(output.asset_id.0.as_bytes());
            buf.extend_from_slice(&output.amount.to_le_bytes());
            put_bytes(&mut buf, &output.control_program);
            match &output.state_data {
                Some(data) => {
                    buf.push(0x01);
                    put_bytes(&mut buf, data);
                }
                None => buf.push(0x00),
            }
        }
        Hash256(blake3::hash(&buf).into())
    }

    /// Digest signed by the witness of input `index`.
    ///
    /// Commits to the whole transaction (all inputs and outputs) plus the
    /// input position, so a signature cannot be moved to another input.
    pub fn sig_hash(&self, index: usize) -> Hash256 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(SIGHASH_DOMAIN);
        hasher.update(self.id().as_bytes());
        hasher.update(&(index as u64).to_le_bytes());
        Hash256(hasher.finalize().into())
    }

    /// Check if this is a coinbase transaction (exactly one coinbase input).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Whether any input is a coinbase input.
    pub fn has_coinbase_input(&self) -> bool {
        self.inputs.iter().any(TxInput::is_coinbase)
    }

    /// IDs of the outputs this transaction creates, in position order.
    pub fn output_ids(&self) -> Vec<Hash256> {
        let id = self.id();
        (0..self.outputs.len() as u64)
            .map(|pos| output_id(&id, pos))
            .collect()
    }

    /// Sum of all output amounts for `asset`. Returns None on overflow.
    pub fn total_output(&self, asset: &AssetId) -> Option<u64> {
        self.outputs
            .iter()
            .filter(|o| &o.asset_id == asset)
            .try_fold(0u64, |acc, o| acc.checked_add(o.amount))
    }
}

/// Per-transaction status flags of a block, one bit per transaction.
///
/// Bit `i` (byte `i / 8`, bit `i % 8`) set means transaction `i` is recorded
/// as failed.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct TxStatus(pub Vec<u8>);

impl TxStatus {
    /// Bitmap sized for `tx_count` transactions, all clear.
    pub fn with_len(tx_count: usize) -> Self {
        Self(vec![0u8; tx_count.div_ceil(8)])
    }

    pub fn is_failed(&self, index: usize) -> bool {
        self.0
            .get(index / 8)
            .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
    }

    pub fn set_failed(&mut self, index: usize, failed: bool) {
        let byte = index / 8;
        if byte >= self.0.len() {
            self.0.resize(byte + 1, 0);
        }
        if failed {
            self.0[byte] |= 1 << (index % 8);
        } else {
            self.0[byte] &= !(1 << (index % 8));
        }
    }
}

/// Block header.
///
/// Hash is double SHA-256 over a fixed little-endian layout.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u64,
    /// Distance from genesis.
    pub height: u64,
    /// Hash of the parent block header.
    pub prev_hash: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Transaction status bitmap.
    pub tx_status: TxStatus,
    /// BLAKE3 merkle root of the block's transaction IDs.
    pub merkle_root: Hash256,
    /// Difficulty target. Higher is easier.
    pub bits: u64,
    /// Proof-of-work nonce.
    pub nonce: u64,
}

impl BlockHeader {
    /// Compute the block header hash (double SHA-256).
    ///
    /// Layout: version || height || prev_hash || timestamp ||
    /// len(tx_status) || tx_status || merkle_root || bits || nonce.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(6 * 8 + 2 * 32 + 4 + self.tx_status.0.len());
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(&self.height.to_le_bytes());
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        put_bytes(&mut data, &self.tx_status.0);
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.bits.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        let first = Sha256::digest(&data);
        Hash256(Sha256::digest(first).into())
    }
}

/// A complete block: header plus transactions.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    pub header: BlockHeader,
    /// Ordered transactions. The first one is the coinbase.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The block ID (header hash).
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Get the coinbase transaction, if the block is non-empty.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Transaction IDs in block order.
    pub fn tx_ids(&self) -> Vec<Hash256> {
        self.transactions.iter().map(Transaction::id).collect()
    }
}

/// A materialized spendable output.
///
/// `account_id`, `address` and `key_index` are annotations filled in by
/// wallets; the chain leaves them empty.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Utxo {
    pub output_id: Hash256,
    pub source_id: Hash256,
    pub asset_id: AssetId,
    pub amount: u64,
    pub source_position: u64,
    pub control_program: Vec<u8>,
    pub account_id: Option<Hash256>,
    pub address: Option<String>,
    pub key_index: Option<u64>,
    /// Height of the block that created this output.
    pub block_height: u64,
    pub is_coinbase: bool,
}

impl Utxo {
    /// Materialize output `position` of `tx` confirmed at `block_height`.
    pub fn from_output(tx_id: Hash256, position: u64, output: &TxOutput, block_height: u64, is_coinbase: bool) -> Self {
        Self {
            output_id: output_id(&tx_id, position),
            source_id: tx_id,
            asset_id: output.asset_id,
            amount: output.amount,
            source_position: position,
            control_program: output.control_program.clone(),
            account_id: None,
            address: None,
            key_index: None,
            block_height,
            is_coinbase,
        }
    }

    /// Whether `spend` claims exactly this output's fields.
    pub fn matches(&self, spend: &SpendInput) -> bool {
        self.output_id == spend.output_id
            && self.source_id == spend.source_id
            && self.source_position == spend.source_position
            && self.asset_id == spend.asset_id
            && self.amount == spend.amount
            && self.control_program == spend.control_program
    }
}

fn put_len(buf: &mut Vec<u8>, len: usize) {
    buf.extend_from_slice(&(len as u64).to_le_bytes());
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_len(buf, bytes.len());
    buf.extend_from_slice(bytes);
}
