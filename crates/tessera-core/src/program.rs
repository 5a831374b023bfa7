//! Control programs: the spending predicates attached to outputs.
//!
//! Two forms are understood by [`StandardPredicate`]:
//!
//! - `OP_TRUE` (`0x51`): spendable by anyone, with an empty witness.
//! - Multisig: `0xAE || version || quorum || n || key_1 .. key_n`, where the
//!   32-byte Ed25519 keys are sorted ascending. The witness holds one
//!   argument per signature: `position (1 byte) || signature (64 bytes)`.
//!
//! Keys are sorted at compile time, so the same key set compiles to the same
//! bytes regardless of the order it was supplied in.

use std::collections::BTreeSet;

use crate::crypto::PublicKey;
use crate::error::ProgramError;
use crate::traits::SpendPredicate;
use crate::types::Hash256;

pub const OP_TRUE: u8 = 0x51;
const MULTISIG_TAG: u8 = 0xAE;
const MULTISIG_VERSION: u8 = 0x01;
const MULTISIG_HEADER_LEN: usize = 4;

/// Maximum number of keys in one multisig program.
pub const MAX_MULTISIG_KEYS: usize = 20;
/// Length of one witness signature argument.
pub const SIGNATURE_ARG_LEN: usize = 65;

/// Program that any witness satisfies.
pub fn anyone_can_spend() -> Vec<u8> {
    vec![OP_TRUE]
}

/// Encode a witness argument carrying `signature` by the key at `position`.
pub fn signature_argument(position: usize, signature: &[u8; 64]) -> Vec<u8> {
    let mut arg = Vec::with_capacity(SIGNATURE_ARG_LEN);
    arg.push(position as u8);
    arg.extend_from_slice(signature);
    arg
}

/// An M-of-N signature predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultisigProgram {
    quorum: usize,
    keys: Vec<[u8; 32]>,
}

impl MultisigProgram {
    /// Build a predicate requiring `quorum` of `keys`.
    ///
    /// Duplicate keys are collapsed before the quorum is checked.
    pub fn new(keys: Vec<[u8; 32]>, quorum: usize) -> Result<Self, ProgramError> {
        let keys: Vec<[u8; 32]> = keys.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        if quorum == 0 || quorum > keys.len() || keys.len() > MAX_MULTISIG_KEYS {
            return Err(ProgramError::InvalidQuorum {
                quorum,
                keys: keys.len(),
            });
        }
        for (i, key) in keys.iter().enumerate() {
            PublicKey::from_bytes(key, i)?;
        }
        Ok(Self { quorum, keys })
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Keys in program order.
    pub fn keys(&self) -> &[[u8; 32]] {
        &self.keys
    }

    /// Position of `key` in the program, used as the witness argument tag.
    pub fn position_of(&self, key: &[u8; 32]) -> Option<usize> {
        self.keys.binary_search(key).ok()
    }

    pub fn compile(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MULTISIG_HEADER_LEN + 32 * self.keys.len());
        out.extend_from_slice(&[
            MULTISIG_TAG,
            MULTISIG_VERSION,
            self.quorum as u8,
            self.keys.len() as u8,
        ]);
        for key in &self.keys {
            out.extend_from_slice(key);
        }
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ProgramError> {
        let [tag, version, quorum, n, rest @ ..] = bytes else {
            return Err(ProgramError::Malformed("truncated multisig header".into()));
        };
        if *tag != MULTISIG_TAG {
            return Err(ProgramError::UnknownType(*tag));
        }
        if *version != MULTISIG_VERSION {
            return Err(ProgramError::Malformed(format!("unsupported version {version}")));
        }
        if rest.len() != 32 * (*n as usize) {
            return Err(ProgramError::Malformed(format!(
                "expected {} key bytes, found {}",
                32 * (*n as usize),
                rest.len()
            )));
        }
        let keys: Vec<[u8; 32]> = rest
            .chunks_exact(32)
            .map(|chunk| {
                let mut key = [0u8; 32];
                key.copy_from_slice(chunk);
                key
            })
            .collect();
        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ProgramError::Malformed("keys not strictly sorted".into()));
        }
        Self::new(keys, *quorum as usize)
    }

    /// Check that `arguments` carry at least `quorum` valid signatures of
    /// `message` from distinct keys.
    pub fn verify(&self, message: &Hash256, arguments: &[Vec<u8>]) -> Result<(), ProgramError> {
        let mut signed = BTreeSet::new();
        for (i, arg) in arguments.iter().enumerate() {
            let Some((&position, sig)) = arg.split_first() else {
                return Err(ProgramError::MalformedArgument(i));
            };
            let position = position as usize;
            let (Some(key), Ok(sig)) = (self.keys.get(position), <&[u8; 64]>::try_from(sig)) else {
                return Err(ProgramError::MalformedArgument(i));
            };
            if PublicKey::from_bytes(key, position)?.verify(message.as_bytes(), sig) {
                signed.insert(position);
            }
        }
        if signed.len() < self.quorum {
            return Err(ProgramError::Unsatisfied {
                have: signed.len(),
                need: self.quorum,
            });
        }
        Ok(())
    }
}

/// A parsed control program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlProgram {
    AnyoneCanSpend,
    Multisig(MultisigProgram),
}

impl ControlProgram {
    pub fn parse(bytes: &[u8]) -> Result<Self, ProgramError> {
        match bytes.first() {
            None => Err(ProgramError::Empty),
            Some(&OP_TRUE) if bytes.len() == 1 => Ok(Self::AnyoneCanSpend),
            Some(&MULTISIG_TAG) => Ok(Self::Multisig(MultisigProgram::parse(bytes)?)),
            Some(other) => Err(ProgramError::UnknownType(*other)),
        }
    }
}

/// Evaluator for the program forms defined in this module.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardPredicate;

impl SpendPredicate for StandardPredicate {
    fn check(&self, program: &[u8], sig_hash: &Hash256, arguments: &[Vec<u8>]) -> Result<(), ProgramError> {
        match ControlProgram::parse(program)? {
            ControlProgram::AnyoneCanSpend => Ok(()),
            ControlProgram::Multisig(multisig) => multisig.verify(sig_hash, arguments),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn keys(n: u8) -> Vec<SigningKey> {
        (1..=n).map(|i| SigningKey::from_bytes(&[i; 32])).collect()
    }

    fn public(sks: &[SigningKey]) -> Vec<[u8; 32]> {
        sks.iter().map(|sk| sk.verifying_key().to_bytes()).collect()
    }

    fn sign_arg(program: &MultisigProgram, sk: &SigningKey, msg: &Hash256) -> Vec<u8> {
        let pos = program.position_of(&sk.verifying_key().to_bytes()).unwrap();
        signature_argument(pos, &sk.sign(msg.as_bytes()).to_bytes())
    }

    #[test]
    fn compile_is_order_independent() {
        let sks = keys(3);
        let mut pks = public(&sks);
        let a = MultisigProgram::new(pks.clone(), 2).unwrap().compile();
        pks.reverse();
        let b = MultisigProgram::new(pks, 2).unwrap().compile();
        assert_eq!(a, b);
        assert_eq!(a.len(), MULTISIG_HEADER_LEN + 3 * 32);
    }

    #[test]
    fn parse_inverts_compile() {
        let program = MultisigProgram::new(public(&keys(3)), 2).unwrap();
        let parsed = ControlProgram::parse(&program.compile()).unwrap();
        assert_eq!(parsed, ControlProgram::Multisig(program));
        assert_eq!(ControlProgram::parse(&anyone_can_spend()).unwrap(), ControlProgram::AnyoneCanSpend);
    }

    #[test]
    fn rejects_bad_quorum() {
        let pks = public(&keys(2));
        assert!(matches!(MultisigProgram::new(pks.clone(), 0), Err(ProgramError::InvalidQuorum { .. })));
        assert!(matches!(MultisigProgram::new(pks, 3), Err(ProgramError::InvalidQuorum { .. })));
        // Duplicates collapse, leaving one key.
        let dup = vec![public(&keys(1))[0]; 2];
        assert!(matches!(
            MultisigProgram::new(dup, 2),
            Err(ProgramError::InvalidQuorum { quorum: 2, keys: 1 })
        ));
    }

    #[test]
    fn rejects_unknown_and_truncated_programs() {
        assert_eq!(ControlProgram::parse(&[]), Err(ProgramError::Empty));
        assert_eq!(ControlProgram::parse(&[0x00]), Err(ProgramError::UnknownType(0x00)));
        assert!(matches!(ControlProgram::parse(&[MULTISIG_TAG, 1]), Err(ProgramError::Malformed(_))));

        let mut bytes = MultisigProgram::new(public(&keys(2)), 1).unwrap().compile();
        bytes.pop();
        assert!(matches!(ControlProgram::parse(&bytes), Err(ProgramError::Malformed(_))));
    }

    #[test]
    fn two_of_three_needs_two_distinct_signers() {
        let sks = keys(3);
        let program = MultisigProgram::new(public(&sks), 2).unwrap();
        let msg = Hash256([0x42; 32]);

        let one = vec![sign_arg(&program, &sks[0], &msg)];
        assert_eq!(program.verify(&msg, &one), Err(ProgramError::Unsatisfied { have: 1, need: 2 }));

        let same_twice = vec![sign_arg(&program, &sks[0], &msg), sign_arg(&program, &sks[0], &msg)];
        assert_eq!(
            program.verify(&msg, &same_twice),
            Err(ProgramError::Unsatisfied { have: 1, need: 2 })
        );

        let two = vec![sign_arg(&program, &sks[2], &msg), sign_arg(&program, &sks[1], &msg)];
        assert!(program.verify(&msg, &two).is_ok());
    }

    #[test]
    fn signature_over_other_message_does_not_count() {
        let sks = keys(1);
        let program = MultisigProgram::new(public(&sks), 1).unwrap();
        let arg = sign_arg(&program, &sks[0], &Hash256([1; 32]));
        assert!(program.verify(&Hash256([2; 32]), &[arg]).is_err());
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        let program = MultisigProgram::new(public(&keys(1)), 1).unwrap();
        let msg = Hash256::ZERO;
        assert_eq!(program.verify(&msg, &[vec![]]), Err(ProgramError::MalformedArgument(0)));
        assert_eq!(program.verify(&msg, &[vec![0; 10]]), Err(ProgramError::MalformedArgument(0)));
        assert_eq!(program.verify(&msg, &[signature_argument(9, &[0; 64])]), Err(ProgramError::MalformedArgument(0)));
    }

    #[test]
    fn standard_predicate_dispatches_on_program_type() {
        let predicate = StandardPredicate;
        assert!(predicate.check(&anyone_can_spend(), &Hash256::ZERO, &[]).is_ok());
        assert!(predicate.check(&[0x01, 0x02], &Hash256::ZERO, &[]).is_err());

        let sks = keys(1);
        let program = MultisigProgram::new(public(&sks), 1).unwrap();
        let msg = Hash256([9; 32]);
        let arg = sign_arg(&program, &sks[0], &msg);
        assert!(predicate.check(&program.compile(), &msg, &[arg]).is_ok());
        assert!(predicate.check(&program.compile(), &msg, &[]).is_err());
    }
}
