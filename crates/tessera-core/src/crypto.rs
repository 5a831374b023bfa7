//! Ed25519 signature verification.
//!
//! The core only verifies. Key material and signing live in the wallet,
//! which produces standard Ed25519 signatures from derived scalars, so any
//! conforming verifier accepts them.

use ed25519_dalek::Verifier;
use std::fmt;

use crate::error::ProgramError;

/// Ed25519 public key appearing in control programs.
#[derive(Clone, Copy)]
pub struct PublicKey {
    verifying_key: ed25519_dalek::VerifyingKey,
}

impl PublicKey {
    /// Parse a compressed 32-byte key. `position` is reported on failure.
    pub fn from_bytes(bytes: &[u8; 32], position: usize) -> Result<Self, ProgramError> {
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|_| ProgramError::InvalidPublicKey(position))?;
        Ok(Self { verifying_key })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Whether `signature` is a valid signature of `message` under this key.
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let sig = ed25519_dalek::Signature::from_bytes(signature);
        self.verifying_key.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}
