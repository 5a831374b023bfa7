//! Hierarchical deterministic Ed25519 keys.
//!
//! Extended keys pair a curve key with a 32-byte chain code. Children are
//! derived additively: a BLAKE3 XOF keyed by the parent chain code over the
//! parent *public* key and the child index yields a scalar tweak and the
//! child chain code, then
//!
//! - `child_pub = parent_pub + tweak * B`
//! - `child_prv = parent_prv + tweak`
//!
//! so [`XPub::derive`] and [`XPrv::derive`] agree without the public side
//! ever touching secret material. Signing hands the derived scalar and a
//! per-key nonce prefix to `ed25519-dalek`'s expanded-key signer, so
//! signatures are standard Ed25519 and verify under any conforming verifier.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::VerifyingKey;
use ed25519_dalek::hazmat::{self, ExpandedSecretKey};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::WalletError;

/// BLAKE3 derive-key context for root keys.
const ROOT_CONTEXT: &str = "tessera 2024-06 hd root key";
/// Domain tag for the per-key signing nonce prefix.
const NONCE_DOMAIN: &[u8] = b"tessera/nonce";
/// Child derivation tag for non-hardened children.
const CHILD_TAG: &[u8] = b"N";

/// Shortest seed accepted by [`derive_root`].
pub const MIN_SEED_LEN: usize = 16;
/// Length of a serialized extended key: key bytes then chain code.
pub const EXTENDED_KEY_LEN: usize = 64;

fn wide_scalar(digest: &[u8]) -> Scalar {
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest[..64]);
    let scalar = Scalar::from_bytes_mod_order_wide(&wide);
    wide.zeroize();
    scalar
}

/// Tweak scalar and child chain code for `index` under a parent.
fn child_material(parent_key: &[u8; 32], chain_code: &[u8; 32], index: u64) -> (Scalar, [u8; 32]) {
    let mut out = [0u8; 96];
    let mut hasher = blake3::Hasher::new_keyed(chain_code);
    hasher.update(CHILD_TAG);
    hasher.update(parent_key);
    hasher.update(&index.to_le_bytes());
    hasher.finalize_xof().fill(&mut out);

    let tweak = wide_scalar(&out[..64]);
    let mut child_chain = [0u8; 32];
    child_chain.copy_from_slice(&out[64..]);
    out.zeroize();
    (tweak, child_chain)
}

fn root_from_seed(seed: &[u8]) -> XPrv {
    let mut out = [0u8; 96];
    let mut hasher = blake3::Hasher::new_derive_key(ROOT_CONTEXT);
    hasher.update(seed);
    hasher.finalize_xof().fill(&mut out);

    let scalar = wide_scalar(&out[..64]);
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&out[64..]);
    out.zeroize();
    XPrv { scalar, chain_code }
}

/// Derive the root key pair for `seed`.
///
/// Fails with [`WalletError::WeakSeed`] when the seed is shorter than
/// [`MIN_SEED_LEN`] or every byte is the same.
pub fn derive_root(seed: &[u8]) -> Result<(XPrv, XPub), WalletError> {
    let weak = seed.len() < MIN_SEED_LEN || seed.iter().all(|b| *b == seed[0]);
    if weak {
        return Err(WalletError::WeakSeed { len: seed.len() });
    }
    let xprv = root_from_seed(seed);
    let xpub = xprv.xpub();
    Ok((xprv, xpub))
}

/// Extended private key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct XPrv {
    scalar: Scalar,
    chain_code: [u8; 32],
}

impl XPrv {
    /// Generate a root key from 64 bytes of OS randomness.
    pub fn generate() -> Self {
        let mut seed = [0u8; 64];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        let xprv = root_from_seed(&seed);
        seed.zeroize();
        xprv
    }

    pub fn xpub(&self) -> XPub {
        XPub::from_point(EdwardsPoint::mul_base(&self.scalar), self.chain_code)
    }

    /// Child private key at `index`.
    pub fn derive(&self, index: u64) -> XPrv {
        let parent_key = self.xpub().key;
        let (tweak, chain_code) = child_material(&parent_key, &self.chain_code, index);
        XPrv {
            scalar: self.scalar + tweak,
            chain_code,
        }
    }

    /// Follow `path` from this key, one index per level.
    pub fn derive_path(&self, path: &[u64]) -> XPrv {
        path.iter().fold(self.clone(), |key, index| key.derive(*index))
    }

    /// Ed25519 signature over `message` by this key.
    ///
    /// The nonce is deterministic: SHA-512 over a secret prefix bound to
    /// this key and the message.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        let mut hash_prefix = [0u8; 32];
        hash_prefix.copy_from_slice(
            &Sha512::new()
                .chain_update(NONCE_DOMAIN)
                .chain_update(self.scalar.as_bytes())
                .chain_update(self.chain_code)
                .finalize()[..32],
        );
        let expanded = ExpandedSecretKey {
            scalar: self.scalar,
            hash_prefix,
        };
        hash_prefix.zeroize();
        sign_expanded(&expanded, message)
    }
}

/// Sign with an expanded Ed25519 key; the public key is recomputed from it.
fn sign_expanded(key: &ExpandedSecretKey, message: &[u8]) -> [u8; 64] {
    let verifying = VerifyingKey::from(key);
    hazmat::raw_sign::<Sha512>(key, message, &verifying).to_bytes()
}

impl fmt::Debug for XPrv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XPrv")
            .field("scalar", &"[REDACTED]")
            .field("xpub", &self.xpub())
            .finish()
    }
}

/// Extended public key.
#[derive(Clone, Copy)]
pub struct XPub {
    key: [u8; 32],
    point: EdwardsPoint,
    chain_code: [u8; 32],
}

impl XPub {
    fn from_point(point: EdwardsPoint, chain_code: [u8; 32]) -> Self {
        Self {
            key: point.compress().to_bytes(),
            point,
            chain_code,
        }
    }

    /// Parse `key || chain_code`. Fails if the key is not a curve point.
    pub fn from_bytes(bytes: &[u8; EXTENDED_KEY_LEN]) -> Result<Self, WalletError> {
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[..32]);
        let point = CompressedEdwardsY(key)
            .decompress()
            .ok_or_else(|| WalletError::InvalidKey("not a curve point".into()))?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&bytes[32..]);
        Ok(Self {
            key,
            point,
            chain_code,
        })
    }

    pub fn to_bytes(&self) -> [u8; EXTENDED_KEY_LEN] {
        let mut out = [0u8; EXTENDED_KEY_LEN];
        out[..32].copy_from_slice(&self.key);
        out[32..].copy_from_slice(&self.chain_code);
        out
    }

    pub fn from_hex(s: &str) -> Result<Self, WalletError> {
        let bytes = hex::decode(s).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        let bytes: [u8; EXTENDED_KEY_LEN] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| WalletError::InvalidKey(format!("expected 64 bytes, got {}", v.len())))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// The 32-byte Ed25519 public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.key
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    /// Child public key at `index`.
    pub fn derive(&self, index: u64) -> XPub {
        let (tweak, chain_code) = child_material(&self.key, &self.chain_code, index);
        XPub::from_point(self.point + EdwardsPoint::mul_base(&tweak), chain_code)
    }

    pub fn derive_path(&self, path: &[u64]) -> XPub {
        path.iter().fold(*self, |key, index| key.derive(*index))
    }
}

impl PartialEq for XPub {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.chain_code == other.chain_code
    }
}

impl Eq for XPub {}

impl Hash for XPub {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.chain_code.hash(state);
    }
}

impl PartialOrd for XPub {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for XPub {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl fmt::Display for XPub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for XPub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XPub({})", self.to_hex())
    }
}

impl FromStr for XPub {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for XPub {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for XPub {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
