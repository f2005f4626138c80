//! Block archive on top of a [`KvStore`].
//!
//! Layout, one namespace per concern:
//!
//! - `"blk_header"`: height (8-byte big endian) -> canonical header bytes,
//! - `"blk_body"`:   height -> canonical `(actions, receipts)` bytes,
//! - `"blk_footer"`: height -> canonical footer bytes,
//! - `"blk_hash"`:   block hash -> height,
//! - `"blk_meta"`:   the archive tip height under the fixed key `"tip"`.
//!
//! A block and the new tip height are written in one batch, so a crash
//! never leaves a half-archived block behind.

use serde::de::DeserializeOwned;
use tracing::debug;

use super::batch::Batch;
use super::kv::KvStore;
use crate::consensus::store::{ArchiveError, BlockArchive};
use crate::protocol::ExecutionContext;
use crate::types::{Action, Block, Footer, Hash256, Header, Receipt, canonical_decode, canonical_encode};

const NS_HEADER: &str = "blk_header";
const NS_BODY: &str = "blk_body";
const NS_FOOTER: &str = "blk_footer";
const NS_HASH: &str = "blk_hash";
const NS_META: &str = "blk_meta";
const TIP_KEY: &[u8] = b"tip";

/// [`BlockArchive`] persisted in a [`KvStore`].
pub struct KvBlockArchive<S> {
    store: S,
}

impl<S: KvStore> KvBlockArchive<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Full block at `height`.
    pub fn block_by_height(&self, height: u64) -> Result<Block, ArchiveError> {
        let header = self.header_by_height(height)?;
        let (actions, receipts): (Vec<Action>, Vec<Receipt>) =
            self.load(NS_BODY, &height.to_be_bytes(), "block body")?;
        let footer = self.footer_by_height(height)?;
        Ok(Block {
            header,
            actions,
            receipts,
            footer,
        })
    }

    fn load<T: DeserializeOwned>(
        &self,
        ns: &str,
        key: &[u8],
        what: &str,
    ) -> Result<T, ArchiveError> {
        let bytes = self
            .store
            .get(ns, key)?
            .ok_or_else(|| ArchiveError::NotFound(format!("{what} {}", hex::encode(key))))?;
        canonical_decode(&bytes).map_err(|e| ArchiveError::Corrupted(format!("{what}: {e}")))
    }
}

fn decode_height(bytes: &[u8]) -> Result<u64, ArchiveError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| ArchiveError::Corrupted(format!("height of length {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

impl<S: KvStore> BlockArchive for KvBlockArchive<S> {
    fn start(&self) -> Result<(), ArchiveError> {
        self.store.start()?;
        Ok(())
    }

    fn stop(&self) -> Result<(), ArchiveError> {
        self.store.stop()?;
        Ok(())
    }

    fn height(&self) -> Result<u64, ArchiveError> {
        match self.store.get(NS_META, TIP_KEY)? {
            Some(bytes) => decode_height(&bytes),
            None => Ok(0),
        }
    }

    fn header_by_height(&self, height: u64) -> Result<Header, ArchiveError> {
        self.load(NS_HEADER, &height.to_be_bytes(), "header")
    }

    fn header(&self, hash: &Hash256) -> Result<Header, ArchiveError> {
        let height = self
            .store
            .get(NS_HASH, hash.as_bytes())?
            .ok_or_else(|| ArchiveError::NotFound(format!("block {hash}")))?;
        self.header_by_height(decode_height(&height)?)
    }

    fn footer_by_height(&self, height: u64) -> Result<Footer, ArchiveError> {
        self.load(NS_FOOTER, &height.to_be_bytes(), "footer")
    }

    fn block_hash(&self, height: u64) -> Result<Hash256, ArchiveError> {
        Ok(self.header_by_height(height)?.hash())
    }

    fn put_block(&self, _ctx: &ExecutionContext, block: &Block) -> Result<(), ArchiveError> {
        let tip = self.height()?;
        let height = block.height();
        if height <= tip {
            return Err(ArchiveError::AlreadyExists(height));
        }
        if height != tip + 1 {
            return Err(ArchiveError::InvalidHeight { height, tip });
        }

        let key = height.to_be_bytes();
        let hash = block.hash();
        let mut batch = Batch::new();
        batch.put(NS_HEADER, &key, &canonical_encode(&block.header));
        batch.put(
            NS_BODY,
            &key,
            &canonical_encode(&(&block.actions, &block.receipts)),
        );
        batch.put(NS_FOOTER, &key, &canonical_encode(&block.footer));
        batch.put(NS_HASH, hash.as_bytes(), &key);
        batch.put(NS_META, TIP_KEY, &key);
        self.store.write_batch(&batch)?;

        debug!(height, hash = %hash, "archived block");
        Ok(())
    }
}
