//! Wallet error types.

use chrono::{DateTime, Utc};
use tessera_core::error::ProgramError;
use tessera_core::types::Hash256;
use thiserror::Error;

/// Errors that can occur in key, account and builder operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Seed too short or without variation.
    #[error("weak seed: {len} bytes")]
    WeakSeed {
        /// Length of the rejected seed.
        len: usize,
    },

    /// Extended key bytes or hex that do not decode.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Quorum outside `1..=keys`.
    #[error("invalid quorum {quorum} for {keys} keys")]
    InvalidQuorum {
        quorum: usize,
        keys: usize,
    },

    /// The same xpub was supplied twice for one account.
    #[error("duplicate xpub in account")]
    DuplicateXPub,

    /// An account with this alias already exists.
    #[error("duplicate alias: {0}")]
    DuplicateAlias(String),

    /// Empty alias.
    #[error("alias must not be empty")]
    EmptyAlias,

    /// No account with this ID or alias.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The UTXO's control program was not derived by the account.
    #[error("unknown control program for account {account}")]
    UnknownControlProgram {
        account: Hash256,
    },

    /// Template built with no inputs or no outputs.
    #[error("transaction has no inputs or no outputs")]
    EmptyTransaction,

    /// Signing attempted after the template's `max_time`.
    #[error("template expired at {max_time}")]
    TemplateExpired {
        max_time: DateTime<Utc>,
    },

    /// Fewer valid signatures than the input's quorum.
    #[error("insufficient signatures on input {input}: have {have}, need {need}")]
    InsufficientSignatures {
        input: usize,
        have: usize,
        need: usize,
    },

    /// Control program construction or parsing failed.
    #[error(transparent)]
    Program(#[from] ProgramError),
}
