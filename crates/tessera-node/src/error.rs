//! Node error types.

use tessera_core::error::{ChainError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("config: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A block commit failed earlier; the node takes no more work until it
    /// is restarted from the last committed tip.
    #[error("node halted after failed commit ({0}); restart required")]
    Halted(StoreError),
}
