//! Error types for the ledger.

use thiserror::Error;

use crate::blockchain::Block;
use crate::codec::CodecError;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("encoding error: {0}")]
    Encoding(#[from] CodecError),

    #[error("corrupt block under key {key:?}: {source}")]
    CorruptBlock {
        key: String,
        #[source]
        source: CodecError,
    },

    #[error("store read failed for key {key:?}: {reason}")]
    StoreRead { key: String, reason: String },

    #[error("store write failed for key {key:?}: {reason}")]
    StoreWrite { key: String, reason: String },

    #[error("no block stored under key {0:?}")]
    NotFound(String),

    /// The block was written under its own hash but the tip key still points
    /// at its predecessor. Retry with `Blockchain::retry_tip_update`.
    #[error("block {hash} persisted but tip update failed: {source}")]
    TipUpdateInconsistency {
        hash: String,
        block: Box<Block>,
        #[source]
        source: Box<ChainError>,
    },

    #[error("iterator exhausted")]
    IteratorExhausted,

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ChainError {
    /// True for the "key absent" case, which callers use to tell a fresh
    /// store apart from a damaged one.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChainError::NotFound(_))
    }
}

/// Failure part-way through a full traversal. `blocks` holds what was read
/// before the failure, oldest first.
#[derive(Debug, Error)]
#[error("chain traversal stopped after {} blocks: {source}", blocks.len())]
pub struct TraversalError {
    pub blocks: Vec<Block>,
    #[source]
    pub source: ChainError,
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
