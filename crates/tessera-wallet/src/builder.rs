//! Transaction templates and signing.
//!
//! Building is split in two steps:
//! 1. [`TxBuilder`] pairs each input with the [`SigningInstruction`] for it
//!    and produces an unsigned [`Template`].
//! 2. [`sign`] walks the instructions, asks a [`KeySource`] for signatures
//!    over each input's `sig_hash` and fills the witnesses.
//!
//! Asset conservation is not checked here; the chain does that when the
//! transaction is validated.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tessera_core::constants::TX_VERSION;
use tessera_core::crypto::PublicKey;
use tessera_core::program::{MultisigProgram, signature_argument};
use tessera_core::types::{Transaction, TxInput, TxOutput};

use crate::account::SigningInstruction;
use crate::error::WalletError;
use crate::keys::{XPrv, XPub};

/// Holder of private keys, queried by root xpub.
pub trait KeySource {
    /// Sign `message` with the key at `path` below `xpub`, or `None` if the
    /// root key is not held here.
    fn sign(&self, xpub: &XPub, path: &[u64], message: &[u8]) -> Option<[u8; 64]>;
}

/// In-memory [`KeySource`] keyed by root xpub.
#[derive(Default)]
pub struct KeyRing {
    keys: HashMap<XPub, XPrv>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root key and return its xpub.
    pub fn insert(&mut self, xprv: XPrv) -> XPub {
        let xpub = xprv.xpub();
        self.keys.insert(xpub, xprv);
        xpub
    }

    pub fn contains(&self, xpub: &XPub) -> bool {
        self.keys.contains_key(xpub)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeySource for KeyRing {
    fn sign(&self, xpub: &XPub, path: &[u64], message: &[u8]) -> Option<[u8; 64]> {
        self.keys.get(xpub).map(|xprv| xprv.derive_path(path).sign(message))
    }
}

/// An unsigned transaction plus what each input needs to be signed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Template {
    pub transaction: Transaction,
    /// One entry per input, in input order.
    pub signing_instructions: Vec<SigningInstruction>,
    /// Signing after this instant fails.
    pub max_time: DateTime<Utc>,
}

/// Accumulates inputs and outputs in order.
pub struct TxBuilder {
    inputs: Vec<TxInput>,
    instructions: Vec<SigningInstruction>,
    outputs: Vec<TxOutput>,
    max_time: DateTime<Utc>,
    time_range: u64,
}

impl TxBuilder {
    pub fn new(max_time: DateTime<Utc>) -> Self {
        Self {
            inputs: Vec::new(),
            instructions: Vec::new(),
            outputs: Vec::new(),
            max_time,
            time_range: 0,
        }
    }

    /// Append an input; `instruction` says how to sign it.
    pub fn add_input(&mut self, input: TxInput, instruction: SigningInstruction) -> &mut Self {
        self.inputs.push(input);
        self.instructions.push(instruction);
        self
    }

    pub fn add_output(&mut self, output: TxOutput) -> &mut Self {
        self.outputs.push(output);
        self
    }

    /// Latest block timestamp the transaction may confirm at. 0 = unbounded.
    pub fn set_time_range(&mut self, time_range: u64) -> &mut Self {
        self.time_range = time_range;
        self
    }

    /// Assemble the unsigned template.
    pub fn build(&self) -> Result<Template, WalletError> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(WalletError::EmptyTransaction);
        }
        let transaction = Transaction {
            version: TX_VERSION,
            time_range: self.time_range,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        };
        debug!(
            tx = %transaction.id(),
            inputs = transaction.inputs.len(),
            outputs = transaction.outputs.len(),
            "built template"
        );
        Ok(Template {
            transaction,
            signing_instructions: self.instructions.clone(),
            max_time: self.max_time,
        })
    }
}

/// Sign `template` now. See [`sign_at`].
pub fn sign(template: &Template, keys: &dyn KeySource) -> Result<Transaction, WalletError> {
    sign_at(template, keys, Utc::now())
}

/// Sign every input of `template` as of `now`.
///
/// Inputs whose instruction has quorum 0 are left unsigned. Every other
/// input must end up with at least its quorum of valid signatures, or
/// signing fails with [`WalletError::InsufficientSignatures`].
pub fn sign_at(template: &Template, keys: &dyn KeySource, now: DateTime<Utc>) -> Result<Transaction, WalletError> {
    if now > template.max_time {
        return Err(WalletError::TemplateExpired {
            max_time: template.max_time,
        });
    }
    let mut tx = template.transaction.clone();

    for (index, instruction) in template.signing_instructions.iter().enumerate() {
        if instruction.quorum == 0 {
            continue;
        }
        let program = MultisigProgram::parse(&instruction.control_program)?;
        let message = tx.sig_hash(index);

        let mut arguments = Vec::with_capacity(instruction.quorum);
        for obligation in &instruction.keys {
            if arguments.len() == instruction.quorum {
                break;
            }
            let child = obligation.xpub.derive_path(&obligation.path).public_key();
            let Some(position) = program.position_of(&child) else {
                warn!(input = index, xpub = %obligation.xpub, "derived key not in program");
                continue;
            };
            let Some(signature) = keys.sign(&obligation.xpub, &obligation.path, message.as_bytes()) else {
                continue;
            };
            if PublicKey::from_bytes(&child, position)?.verify(message.as_bytes(), &signature) {
                arguments.push(signature_argument(position, &signature));
            }
        }

        if arguments.len() < instruction.quorum {
            return Err(WalletError::InsufficientSignatures {
                input: index,
                have: arguments.len(),
                need: instruction.quorum,
            });
        }
        if let Some(TxInput::Spend(spend)) = tx.inputs.get_mut(index) {
            spend.arguments = arguments;
        }
    }
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountManager, spend_input};
    use crate::keys::derive_root;
    use chrono::Duration;
    use tessera_core::constants::NATIVE_ASSET;
    use tessera_core::program::{StandardPredicate, anyone_can_spend};
    use tessera_core::traits::SpendPredicate;
    use tessera_core::types::{Hash256, Utxo};

    fn root(tag: u8) -> (XPrv, XPub) {
        let seed: Vec<u8> = (0..32u8).map(|i| i.wrapping_mul(3) ^ tag).collect();
        derive_root(&seed).unwrap()
    }

    fn later() -> DateTime<Utc> {
        Utc::now() + Duration::minutes(10)
    }

    fn funded(program: Vec<u8>) -> Utxo {
        Utxo::from_output(Hash256([5; 32]), 0, &TxOutput::new(NATIVE_ASSET, 1_000, program), 1, false)
    }

    /// An account of `n` roots with quorum `m`, a UTXO it owns, and the keys.
    fn setup(m: usize, n: u8) -> (AccountManager, Hash256, Utxo, Vec<XPrv>) {
        let roots: Vec<(XPrv, XPub)> = (1..=n).map(root).collect();
        let manager = AccountManager::new();
        let account = manager
            .create(roots.iter().map(|(_, xpub)| *xpub).collect(), m, "acct")
            .unwrap();
        let addr = manager.create_address(&account.id, false).unwrap();
        let utxo = funded(addr.control_program);
        (manager, account.id, utxo, roots.into_iter().map(|(xprv, _)| xprv).collect())
    }

    fn template_for(manager: &AccountManager, account: &Hash256, utxo: &Utxo) -> Template {
        let (input, instruction) = manager.utxo_to_inputs(account, utxo).unwrap();
        TxBuilder::new(later())
            .add_input(input, instruction)
            .add_output(TxOutput::new(NATIVE_ASSET, 1_000, anyone_can_spend()))
            .build()
            .unwrap()
    }

    // -------------------------------------------------------------------
    // Build
    // -------------------------------------------------------------------

    #[test]
    fn build_requires_inputs_and_outputs() {
        let mut builder = TxBuilder::new(later());
        assert_eq!(builder.build().unwrap_err(), WalletError::EmptyTransaction);
        builder.add_output(TxOutput::new(NATIVE_ASSET, 1, anyone_can_spend()));
        assert_eq!(builder.build().unwrap_err(), WalletError::EmptyTransaction);
    }

    #[test]
    fn build_preserves_order() {
        let a = funded(vec![0x51]);
        let b = Utxo::from_output(Hash256([6; 32]), 2, &TxOutput::new(NATIVE_ASSET, 7, vec![0x51]), 1, false);
        let template = TxBuilder::new(later())
            .add_input(spend_input(&a), SigningInstruction::unsigned(a.control_program.clone()))
            .add_input(spend_input(&b), SigningInstruction::unsigned(b.control_program.clone()))
            .add_output(TxOutput::new(NATIVE_ASSET, 5, vec![0x51]))
            .add_output(TxOutput::new(NATIVE_ASSET, 6, vec![0x51]))
            .build()
            .unwrap();
        let tx = &template.transaction;
        assert_eq!(tx.inputs[0].spent_output_id(), Some(&a.output_id));
        assert_eq!(tx.inputs[1].spent_output_id(), Some(&b.output_id));
        assert_eq!(tx.outputs[1].amount, 6);
        assert_eq!(template.signing_instructions.len(), 2);
    }

    // -------------------------------------------------------------------
    // Sign
    // -------------------------------------------------------------------

    #[test]
    fn single_key_signature_satisfies_program() {
        let (manager, account, utxo, keys) = setup(1, 1);
        let template = template_for(&manager, &account, &utxo);
        let mut ring = KeyRing::new();
        for k in keys {
            ring.insert(k);
        }

        let tx = sign(&template, &ring).unwrap();
        assert_eq!(tx.id(), template.transaction.id());
        let TxInput::Spend(spend) = &tx.inputs[0] else { panic!("expected spend") };
        assert_eq!(spend.arguments.len(), 1);
        StandardPredicate
            .check(&spend.control_program, &tx.sig_hash(0), &spend.arguments)
            .unwrap();
    }

    #[test]
    fn two_of_two_with_one_key_is_insufficient() {
        let (manager, account, utxo, keys) = setup(2, 2);
        let template = template_for(&manager, &account, &utxo);
        let mut ring = KeyRing::new();
        ring.insert(keys[0].clone());

        assert_eq!(
            sign(&template, &ring).unwrap_err(),
            WalletError::InsufficientSignatures { input: 0, have: 1, need: 2 }
        );
    }

    #[test]
    fn two_of_three_signs_with_any_two() {
        let (manager, account, utxo, keys) = setup(2, 3);
        let template = template_for(&manager, &account, &utxo);
        let mut ring = KeyRing::new();
        ring.insert(keys[0].clone());
        ring.insert(keys[2].clone());

        let tx = sign(&template, &ring).unwrap();
        let TxInput::Spend(spend) = &tx.inputs[0] else { panic!("expected spend") };
        assert_eq!(spend.arguments.len(), 2);
        StandardPredicate
            .check(&spend.control_program, &tx.sig_hash(0), &spend.arguments)
            .unwrap();
    }

    #[test]
    fn unsigned_instruction_is_skipped() {
        let utxo = funded(anyone_can_spend());
        let template = TxBuilder::new(later())
            .add_input(spend_input(&utxo), SigningInstruction::unsigned(utxo.control_program.clone()))
            .add_output(TxOutput::new(NATIVE_ASSET, 1_000, anyone_can_spend()))
            .build()
            .unwrap();
        let tx = sign(&template, &KeyRing::new()).unwrap();
        assert_eq!(tx, template.transaction);
    }

    #[test]
    fn expired_template_is_rejected() {
        let (manager, account, utxo, keys) = setup(1, 1);
        let template = template_for(&manager, &account, &utxo);
        let mut ring = KeyRing::new();
        ring.insert(keys[0].clone());

        let after = template.max_time + Duration::seconds(1);
        assert_eq!(
            sign_at(&template, &ring, after).unwrap_err(),
            WalletError::TemplateExpired { max_time: template.max_time }
        );
    }

    #[test]
    fn signature_commits_to_outputs() {
        let (manager, account, utxo, keys) = setup(1, 1);
        let template = template_for(&manager, &account, &utxo);
        let mut ring = KeyRing::new();
        ring.insert(keys[0].clone());

        let mut tx = sign(&template, &ring).unwrap();
        tx.outputs[0].amount -= 1;
        let TxInput::Spend(spend) = &tx.inputs[0] else { panic!("expected spend") };
        assert!(StandardPredicate
            .check(&spend.control_program, &tx.sig_hash(0), &spend.arguments)
            .is_err());
    }

    #[test]
    fn template_serializes() {
        let (manager, account, utxo, _) = setup(1, 1);
        let template = template_for(&manager, &account, &utxo);
        let json = serde_json::to_string(&template).unwrap();
        let back: Template = serde_json::from_str(&json).unwrap();
        assert_eq!(back, template);
    }
}
