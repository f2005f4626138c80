//! Block archive abstraction used by the chain engine.

use thiserror::Error;

use crate::protocol::ExecutionContext;
use crate::storage::StoreError;
use crate::types::{Block, Footer, Hash256, Header};

/// Archive-level error type.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The block is already archived; committing it again is a no-op.
    #[error("block {0} already exists")]
    AlreadyExists(u64),

    /// The block does not extend the archive tip.
    #[error("cannot archive block {height} on top of height {tip}")]
    InvalidHeight { height: u64, tip: u64 },

    #[error("{0} not found")]
    NotFound(String),

    /// Stored bytes could not be decoded.
    #[error("corrupted archive entry: {0}")]
    Corrupted(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Durable, height-ordered block storage.
///
/// Implementations can be backed by any [`crate::storage::KvStore`], a flat
/// file format, etc. The engine only relies on this small surface plus the
/// distinguishable [`ArchiveError::AlreadyExists`] outcome of
/// [`BlockArchive::put_block`].
pub trait BlockArchive: Send + Sync {
    fn start(&self) -> Result<(), ArchiveError>;

    fn stop(&self) -> Result<(), ArchiveError>;

    /// Height of the last archived block; 0 when only genesis exists.
    fn height(&self) -> Result<u64, ArchiveError>;

    fn header_by_height(&self, height: u64) -> Result<Header, ArchiveError>;

    fn header(&self, hash: &Hash256) -> Result<Header, ArchiveError>;

    fn footer_by_height(&self, height: u64) -> Result<Footer, ArchiveError>;

    fn block_hash(&self, height: u64) -> Result<Hash256, ArchiveError>;

    /// Persists `block` at `archive height + 1`.
    fn put_block(&self, ctx: &ExecutionContext, block: &Block) -> Result<(), ArchiveError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal archive that never holds a block; good for checking
    /// trait-object use without a backing store.
    struct EmptyArchive;

    impl BlockArchive for EmptyArchive {
        fn start(&self) -> Result<(), ArchiveError> {
            Ok(())
        }

        fn stop(&self) -> Result<(), ArchiveError> {
            Ok(())
        }

        fn height(&self) -> Result<u64, ArchiveError> {
            Ok(0)
        }

        fn header_by_height(&self, height: u64) -> Result<Header, ArchiveError> {
            Err(ArchiveError::NotFound(format!("header {height}")))
        }

        fn header(&self, hash: &Hash256) -> Result<Header, ArchiveError> {
            Err(ArchiveError::NotFound(format!("header {hash}")))
        }

        fn footer_by_height(&self, height: u64) -> Result<Footer, ArchiveError> {
            Err(ArchiveError::NotFound(format!("footer {height}")))
        }

        fn block_hash(&self, height: u64) -> Result<Hash256, ArchiveError> {
            Err(ArchiveError::NotFound(format!("hash {height}")))
        }

        fn put_block(&self, _ctx: &ExecutionContext, block: &Block) -> Result<(), ArchiveError> {
            Err(ArchiveError::AlreadyExists(block.height()))
        }
    }

    #[test]
    fn block_archive_trait_is_object_safe() {
        fn use_trait_object(archive: &dyn BlockArchive) -> u64 {
            archive.height().expect("height")
        }

        assert_eq!(use_trait_object(&EmptyArchive), 0);
        assert!(matches!(
            EmptyArchive.block_hash(3),
            Err(ArchiveError::NotFound(_))
        ));
    }
}
