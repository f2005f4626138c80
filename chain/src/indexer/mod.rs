//! Block-driven secondary indexes.
//!
//! An [`IncrementalIndexer`] consumes committed blocks one at a time. For
//! each block it:
//!
//! - scans the successful receipts for logs emitted by the watched
//!   contract,
//! - feeds them to a fresh [`EventHandler`], which accumulates a durable
//!   write [`Batch`] and an in-memory delta,
//! - merges the delta into the live cache and writes the batch together
//!   with the new checkpoint height.
//!
//! If either the merge or the write fails, the cache is thrown away and
//! rebuilt from the store, so the in-memory state never runs ahead of the
//! last durable checkpoint. If the rebuild fails too, the indexer drops to
//! not ready and refuses blocks and reads until it is started again.
//!
//! Concrete indexes implement [`IndexCache`]; [`staking`] is the contract
//! staking instantiation.

pub mod error;
pub mod staking;

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::{debug, error, info, warn};

use crate::consensus::error::SubscriberError;
use crate::consensus::subscriber::BlockSubscriber;
use crate::storage::{Batch, KvStore};
use crate::types::{Address, Block, Log};

pub use error::IndexerError;
pub use staking::{
    Bucket, BucketType, StakingCache, StakingIndexer, StakingIndexerConfig, StakingView,
    VoteWeightFn,
};

/// Key of the checkpoint height inside the indexer namespace.
pub const CHECKPOINT_KEY: &[u8] = b"height";

/// Accumulates the effects of one block's events.
pub trait EventHandler<C>: Send {
    /// In-memory changes produced by the block.
    type Delta;

    /// Applies one matching log. `cache` is the committed state before
    /// this block; changes must go to the handler, never to the cache.
    fn handle_event(&mut self, cache: &C, height: u64, log: &Log) -> Result<(), IndexerError>;

    /// Durable writes and the delta for the whole block.
    fn result(self) -> (Batch, Self::Delta);
}

/// In-memory state of an index, versioned by the last applied height.
pub trait IndexCache: Clone + Default + Send + Sync {
    type Handler: EventHandler<Self>;

    /// Height of the last merged block; 0 before any block.
    fn height(&self) -> u64;

    /// Fresh handler for the next block.
    fn new_handler(&self) -> Self::Handler;

    /// Merges one block's delta and advances to `height`.
    fn merge(
        &mut self,
        delta: <Self::Handler as EventHandler<Self>>::Delta,
        height: u64,
    ) -> Result<(), IndexerError>;

    /// Rebuilds the cache from persisted state at checkpoint `height`.
    fn load<S: KvStore + ?Sized>(store: &S, height: u64) -> Result<Self, IndexerError>;
}

/// Static configuration of an [`IncrementalIndexer`].
#[derive(Clone, Debug)]
pub struct IndexerConfig {
    /// Namespace holding the checkpoint; also the indexer's name in logs.
    pub namespace: String,
    /// First height the index applies to; reads below it are empty.
    pub start_height: u64,
    /// Only logs emitted by this address are indexed.
    pub contract_address: Address,
}

/// Generic block-driven index over a [`KvStore`].
///
/// `put_block` must not be called concurrently for the same indexer; reads
/// and views may be taken at any time.
pub struct IncrementalIndexer<S, C> {
    store: S,
    config: IndexerConfig,
    cache: RwLock<C>,
    ready: AtomicBool,
}

impl<S: KvStore, C: IndexCache> IncrementalIndexer<S, C> {
    pub fn new(store: S, config: IndexerConfig) -> Self {
        Self {
            store,
            config,
            cache: RwLock::new(C::default()),
            ready: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Height of the last indexed block.
    pub fn height(&self) -> u64 {
        self.cache.read().height()
    }

    pub fn start_height(&self) -> u64 {
        self.config.start_height
    }

    pub fn contract_address(&self) -> Address {
        self.config.contract_address
    }

    /// Starts the store and loads the cache. A no-op when already ready.
    pub fn start(&self) -> Result<(), IndexerError> {
        if self.is_ready() {
            return Ok(());
        }
        self.start_inner()
    }

    fn start_inner(&self) -> Result<(), IndexerError> {
        self.store.start()?;
        let loaded = self.load()?;
        let height = loaded.height();
        *self.cache.write() = loaded;
        self.ready.store(true, Ordering::SeqCst);
        info!(indexer = %self.config.namespace, height, "indexer started");
        Ok(())
    }

    /// Stops the store and drops the cache.
    pub fn stop(&self) -> Result<(), IndexerError> {
        self.store.stop()?;
        *self.cache.write() = C::default();
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Independent copy of the cache at its current height, starting the
    /// indexer first if needed.
    pub fn start_view(&self) -> Result<C, IndexerError> {
        if !self.is_ready() {
            self.start_inner()?;
        }
        Ok(self.cache.read().clone())
    }

    /// Runs `f` against the cache as of `height`.
    ///
    /// Returns `Ok(None)` below the start height, where the index does not
    /// apply yet, and an error above the indexed height or while not ready.
    pub fn read<R>(&self, height: u64, f: impl FnOnce(&C) -> R) -> Result<Option<R>, IndexerError> {
        let cache = self.cache.read();
        if !self.is_ready() {
            return Err(IndexerError::NotReady);
        }
        if height < self.config.start_height {
            return Ok(None);
        }
        if height > cache.height() {
            return Err(IndexerError::NotIndexed {
                height,
                indexed: cache.height(),
            });
        }
        Ok(Some(f(&cache)))
    }

    /// Indexes `block` if it is the next expected one.
    ///
    /// Heights below the expected one are ignored; heights above it fail
    /// without touching the cache.
    pub fn put_block(&self, block: &Block) -> Result<(), IndexerError> {
        let cache = self.cache.upgradable_read();
        if !self.is_ready() {
            return Err(IndexerError::NotReady);
        }
        let expected = (cache.height() + 1).max(self.config.start_height);
        let height = block.height();
        if height < expected {
            return Ok(());
        }
        if height > expected {
            return Err(IndexerError::InvalidHeight { height, expected });
        }

        let mut handler = cache.new_handler();
        let logs = block
            .receipts
            .iter()
            .filter(|r| r.is_success())
            .flat_map(|r| r.logs.iter())
            .filter(|l| l.address == self.config.contract_address);
        for log in logs {
            handler.handle_event(&cache, height, log)?;
        }
        let (mut batch, delta) = handler.result();

        let mut cache = RwLockUpgradableReadGuard::upgrade(cache);
        if let Err(e) = cache.merge(delta, height) {
            warn!(indexer = %self.config.namespace, height, error = %e, "merge failed, reloading cache");
            self.reload(&mut cache);
            return Err(e);
        }
        batch.put(&self.config.namespace, CHECKPOINT_KEY, &height.to_be_bytes());
        if let Err(e) = self.store.write_batch(&batch) {
            warn!(indexer = %self.config.namespace, height, error = %e, "write failed, reloading cache");
            self.reload(&mut cache);
            return Err(e.into());
        }

        debug!(indexer = %self.config.namespace, height, writes = batch.len(), "indexed block");
        Ok(())
    }

    fn load(&self) -> Result<C, IndexerError> {
        let height = match self.store.get(&self.config.namespace, CHECKPOINT_KEY)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    IndexerError::Corrupted(format!("checkpoint of length {}", bytes.len()))
                })?;
                u64::from_be_bytes(arr)
            }
            None => 0,
        };
        C::load(&self.store, height)
    }

    /// Rebuilds `cache` from the store. On failure the indexer is marked
    /// not ready so that the next start loads the checkpoint again.
    fn reload(&self, cache: &mut C) {
        *cache = C::default();
        match self.load() {
            Ok(loaded) => *cache = loaded,
            Err(e) => {
                self.ready.store(false, Ordering::SeqCst);
                error!(indexer = %self.config.namespace, error = %e, "failed to reload cache");
            }
        }
    }
}

impl<S: KvStore, C: IndexCache> BlockSubscriber for IncrementalIndexer<S, C> {
    fn name(&self) -> &str {
        &self.config.namespace
    }

    fn receive_block(&self, block: &Block) -> Result<(), SubscriberError> {
        self.put_block(block).map_err(|e| SubscriberError::Failed {
            name: self.config.namespace.clone(),
            reason: e.to_string(),
        })
    }
}
