//! Storage layer for the chain.
//!
//! This module provides the namespaced [`KvStore`] abstraction and what is
//! built on top of it:
//!
//! - an in-memory store ([`mem::MemKvStore`]) suitable for tests,
//! - a RocksDB-backed store ([`rocksdb::RocksDbKvStore`]) for persistent
//!   nodes,
//! - the buffered store ([`buffered::KvStoreWithBuffer`]) with snapshot,
//!   revert and atomic flush,
//! - a block archive ([`archive::KvBlockArchive`]) implementing
//!   [`crate::consensus::store::BlockArchive`].

pub mod archive;
pub mod batch;
pub mod buffered;
pub mod kv;
pub mod mem;
pub mod rocksdb;

pub use archive::KvBlockArchive;
pub use batch::{Batch, CachedBatch, WriteInfo, WriteType};
pub use buffered::{FlusherOptions, KvStoreFlusher, KvStoreWithBuffer};
pub use kv::{Condition, KvPairs, KvStore, StoreError};
pub use mem::MemKvStore;
pub use self::rocksdb::{RocksDbConfig, RocksDbKvStore};
