//! Multisig accounts and the control programs they own.
//!
//! An account is a quorum over a set of root xpubs. Each address allocates
//! the account's next key index, derives every xpub's child at
//! `[ACCOUNT_SCOPE, key_index]` and compiles an M-of-N program over those
//! children. [`AccountManager`] remembers every program it hands out so a
//! UTXO can later be mapped back to the keys that must sign for it.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use tessera_core::program::{MAX_MULTISIG_KEYS, MultisigProgram};
use tessera_core::types::{Hash256, SpendInput, TxInput, Utxo};

use crate::error::WalletError;
use crate::keys::XPub;

/// First path level of every account-derived key.
pub const ACCOUNT_SCOPE: u64 = 1;

/// Base58 version byte of program addresses.
const ADDRESS_VERSION: u8 = 0x2A;

/// A quorum of root xpubs under one alias.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: Hash256,
    pub alias: String,
    /// Sorted, distinct root keys.
    pub xpubs: Vec<XPub>,
    pub quorum: usize,
    /// Next key index to allocate.
    pub next_key_index: u64,
}

impl Account {
    /// Derivation path of the account key at `key_index`.
    pub fn path(key_index: u64) -> Vec<u64> {
        vec![ACCOUNT_SCOPE, key_index]
    }

    /// Compile the control program at `key_index`.
    ///
    /// The same `(xpubs, quorum, key_index)` always yields the same bytes.
    pub fn program_at(&self, key_index: u64) -> Result<Vec<u8>, WalletError> {
        let path = Self::path(key_index);
        let keys = self
            .xpubs
            .iter()
            .map(|xpub| xpub.derive_path(&path).public_key())
            .collect();
        Ok(MultisigProgram::new(keys, self.quorum)?.compile())
    }
}

fn account_id(alias: &str, quorum: usize, xpubs: &[XPub]) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"tessera/account");
    hasher.update(alias.as_bytes());
    hasher.update(&(quorum as u64).to_le_bytes());
    for xpub in xpubs {
        hasher.update(&xpub.to_bytes());
    }
    Hash256(hasher.finalize().into())
}

/// Base58Check address of a control program.
pub fn address_for_program(program: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(37);
    bytes.push(ADDRESS_VERSION);
    bytes.extend_from_slice(blake3::hash(program).as_bytes());
    let checksum = Sha256::digest(Sha256::digest(&bytes));
    bytes.extend_from_slice(&checksum[..4]);
    bs58::encode(bytes).into_string()
}

/// An address handed out by [`AccountManager::create_address`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AccountAddress {
    pub account_id: Hash256,
    pub key_index: u64,
    pub change: bool,
    pub control_program: Vec<u8>,
    pub address: String,
}

/// One key that may contribute a signature.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct KeyObligation {
    /// Root key the signer holds.
    pub xpub: XPub,
    /// Path from `xpub` to the key inside the program.
    pub path: Vec<u64>,
}

/// What signing one input requires.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SigningInstruction {
    /// Signatures needed. Zero means the program needs none.
    pub quorum: usize,
    pub control_program: Vec<u8>,
    pub keys: Vec<KeyObligation>,
}

impl SigningInstruction {
    /// Instruction for an input whose program needs no signatures.
    pub fn unsigned(control_program: Vec<u8>) -> Self {
        Self {
            quorum: 0,
            control_program,
            keys: Vec::new(),
        }
    }
}

/// Build a spend of `utxo` with an empty witness.
pub fn spend_input(utxo: &Utxo) -> TxInput {
    TxInput::Spend(SpendInput {
        output_id: utxo.output_id,
        source_id: utxo.source_id,
        source_position: utxo.source_position,
        asset_id: utxo.asset_id,
        amount: utxo.amount,
        control_program: utxo.control_program.clone(),
        arguments: Vec::new(),
    })
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<Hash256, Account>,
    aliases: HashMap<String, Hash256>,
    programs: HashMap<Vec<u8>, AccountAddress>,
}

/// Registry of accounts and the programs derived from them.
#[derive(Default)]
pub struct AccountManager {
    inner: RwLock<Inner>,
}

impl AccountManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account requiring `quorum` of `xpubs`.
    ///
    /// Aliases are case-insensitive and must be unique.
    pub fn create(&self, xpubs: Vec<XPub>, quorum: usize, alias: &str) -> Result<Account, WalletError> {
        let alias = alias.trim().to_lowercase();
        if alias.is_empty() {
            return Err(WalletError::EmptyAlias);
        }
        if quorum < 1 || quorum > xpubs.len() || xpubs.len() > MAX_MULTISIG_KEYS {
            return Err(WalletError::InvalidQuorum {
                quorum,
                keys: xpubs.len(),
            });
        }
        let mut xpubs = xpubs;
        xpubs.sort();
        if xpubs.windows(2).any(|w| w[0] == w[1]) {
            return Err(WalletError::DuplicateXPub);
        }

        let mut inner = self.inner.write();
        if inner.aliases.contains_key(&alias) {
            return Err(WalletError::DuplicateAlias(alias));
        }
        let account = Account {
            id: account_id(&alias, quorum, &xpubs),
            alias: alias.clone(),
            xpubs,
            quorum,
            next_key_index: 1,
        };
        inner.aliases.insert(alias, account.id);
        inner.accounts.insert(account.id, account.clone());
        info!(id = %account.id, alias = %account.alias, quorum, keys = account.xpubs.len(), "created account");
        Ok(account)
    }

    pub fn find_by_id(&self, id: &Hash256) -> Option<Account> {
        self.inner.read().accounts.get(id).cloned()
    }

    pub fn find_by_alias(&self, alias: &str) -> Option<Account> {
        let inner = self.inner.read();
        let id = inner.aliases.get(&alias.trim().to_lowercase())?;
        inner.accounts.get(id).cloned()
    }

    /// All accounts, ordered by alias.
    pub fn list(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self.inner.read().accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.alias.cmp(&b.alias));
        accounts
    }

    /// Remove an account and forget its programs.
    pub fn delete(&self, id: &Hash256) -> Result<Account, WalletError> {
        let mut inner = self.inner.write();
        let account = inner
            .accounts
            .remove(id)
            .ok_or_else(|| WalletError::AccountNotFound(id.to_string()))?;
        inner.aliases.remove(&account.alias);
        inner.programs.retain(|_, addr| addr.account_id != *id);
        info!(id = %id, alias = %account.alias, "deleted account");
        Ok(account)
    }

    /// Allocate the account's next key index and register its program.
    pub fn create_address(&self, account_id: &Hash256, change: bool) -> Result<AccountAddress, WalletError> {
        let mut inner = self.inner.write();
        let account = inner
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| WalletError::AccountNotFound(account_id.to_string()))?;

        let key_index = account.next_key_index;
        let control_program = account.program_at(key_index)?;
        account.next_key_index += 1;

        let record = AccountAddress {
            account_id: *account_id,
            key_index,
            change,
            address: address_for_program(&control_program),
            control_program,
        };
        inner.programs.insert(record.control_program.clone(), record.clone());
        debug!(account = %account_id, key_index, change, "derived address");
        Ok(record)
    }

    /// The registered address owning `program`, if any account derived it.
    pub fn program_owner(&self, program: &[u8]) -> Option<AccountAddress> {
        self.inner.read().programs.get(program).cloned()
    }

    /// Fill in the account annotations of `utxo` when one of our programs
    /// controls it. Returns whether it did.
    pub fn annotate(&self, utxo: &mut Utxo) -> bool {
        let Some(record) = self.program_owner(&utxo.control_program) else {
            return false;
        };
        utxo.account_id = Some(record.account_id);
        utxo.address = Some(record.address);
        utxo.key_index = Some(record.key_index);
        true
    }

    /// Build the input spending `utxo` and the instruction for signing it.
    ///
    /// Fails with [`WalletError::UnknownControlProgram`] unless the UTXO's
    /// program was derived by `account_id`.
    pub fn utxo_to_inputs(&self, account_id: &Hash256, utxo: &Utxo) -> Result<(TxInput, SigningInstruction), WalletError> {
        let inner = self.inner.read();
        let account = inner
            .accounts
            .get(account_id)
            .ok_or_else(|| WalletError::AccountNotFound(account_id.to_string()))?;
        let record = inner
            .programs
            .get(&utxo.control_program)
            .filter(|record| record.account_id == *account_id)
            .ok_or(WalletError::UnknownControlProgram { account: *account_id })?;

        let path = Account::path(record.key_index);
        let instruction = SigningInstruction {
            quorum: account.quorum,
            control_program: utxo.control_program.clone(),
            keys: account
                .xpubs
                .iter()
                .map(|xpub| KeyObligation {
                    xpub: *xpub,
                    path: path.clone(),
                })
                .collect(),
        };
        Ok((spend_input(utxo), instruction))
    }
}
