//! # tessera-node — storage, configuration and node composition.
//!
//! - [`storage::RocksStore`] — the chain [`Store`](tessera_core::store::Store) on RocksDB
//! - [`node::Node`] — opens storage, builds the chain and connects genesis
//! - [`config::NodeConfig`] — file and environment configuration

pub mod config;
pub mod error;
pub mod node;
pub mod storage;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::{Node, NodeStatus};
pub use storage::RocksStore;
