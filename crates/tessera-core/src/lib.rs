//! # tessera-core
//! Data model, validation rules, and the chain state machine for a
//! multi-asset UTXO ledger.

pub mod block_validation;
pub mod chain;
pub mod constants;
pub mod crypto;
pub mod difficulty;
pub mod error;
pub mod genesis;
pub mod mempool;
pub mod merkle;
pub mod params;
pub mod program;
pub mod reward;
pub mod store;
pub mod traits;
pub mod types;
pub mod utxo;
pub mod validation;
