//! Errors raised by block-driven indexers.

use thiserror::Error;

use crate::consensus::error::ErrorKind;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum IndexerError {
    /// Block delivered ahead of the next expected height.
    #[error("invalid block height {height}, expect {expected}")]
    InvalidHeight { height: u64, expected: u64 },

    /// Indexer not started, or its cache could not be reloaded.
    #[error("indexer is not ready")]
    NotReady,

    /// Read at a height the cache has not reached yet.
    #[error("height {height} is not indexed yet, indexed up to {indexed}")]
    NotIndexed { height: u64, indexed: u64 },

    /// A contract event that cannot be applied.
    #[error("invalid event: {0}")]
    Event(String),

    /// Delta that does not line up with the cache.
    #[error("failed to merge delta at height {height}: {reason}")]
    Merge { height: u64, reason: String },

    /// Persisted index state that does not decode.
    #[error("corrupted index state: {0}")]
    Corrupted(String),

    /// Invalid indexer construction parameters.
    #[error("invalid indexer configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IndexerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexerError::InvalidHeight { .. } | IndexerError::NotIndexed { .. } => {
                ErrorKind::Consistency
            }
            IndexerError::Event(_) => ErrorKind::Validity,
            IndexerError::Merge { .. } | IndexerError::Corrupted(_) => ErrorKind::Consistency,
            IndexerError::NotReady | IndexerError::Config(_) => ErrorKind::Operational,
            IndexerError::Store(_) => ErrorKind::Storage,
        }
    }
}
