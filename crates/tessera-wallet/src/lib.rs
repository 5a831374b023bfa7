//! # tessera-wallet — keys, accounts and transaction signing.
//!
//! # Modules
//!
//! - [`error`] — `WalletError` enum
//! - [`keys`] — `XPrv`/`XPub` hierarchical deterministic keys
//! - [`account`] — multisig accounts, address derivation, spend inputs
//! - [`builder`] — transaction templates, key sources and signing

pub mod account;
pub mod builder;
pub mod error;
pub mod keys;

pub use account::{Account, AccountAddress, AccountManager, KeyObligation, SigningInstruction};
pub use builder::{KeyRing, KeySource, Template, TxBuilder, sign, sign_at};
pub use error::WalletError;
pub use keys::{XPrv, XPub, derive_root};
