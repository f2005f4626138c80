//! Namespaced key-value store abstraction.
//!
//! Every persistent component of the node (block archive, buffered state,
//! secondary indexes) talks to storage through [`KvStore`]. Keys live in
//! string namespaces; backends map a namespace to whatever grouping they
//! support (a map, a RocksDB column family, ...).

use std::sync::Arc;

use thiserror::Error;

use super::batch::Batch;

/// Key/value pairs returned by [`KvStore::filter`], ordered by key.
pub type KvPairs = Vec<(Vec<u8>, Vec<u8>)>;

/// Predicate applied to candidate entries in [`KvStore::filter`].
pub type Condition<'a> = &'a dyn Fn(&[u8], &[u8]) -> bool;

/// Storage-level error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation was cancelled before it completed.
    #[error("store operation cancelled")]
    Cancelled,

    /// The store has not been started or was already stopped.
    #[error("store is not running")]
    NotRunning,

    /// Snapshot id is unknown to the write buffer.
    #[error("invalid snapshot {0}")]
    InvalidSnapshot(usize),

    /// Underlying RocksDB error.
    #[error("rocksdb: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Any other backend failure.
    #[error("backend: {0}")]
    Backend(String),
}

/// Abstract namespaced key-value store.
///
/// Implementations must apply [`KvStore::write_batch`] atomically: either
/// every entry becomes visible or none does.
pub trait KvStore: Send + Sync {
    /// Opens resources needed by the store.
    fn start(&self) -> Result<(), StoreError>;

    /// Releases resources. A stopped store may be started again.
    fn stop(&self) -> Result<(), StoreError>;

    /// Reads `key` from `ns`; `Ok(None)` if absent.
    fn get(&self, ns: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes a single entry.
    fn put(&self, ns: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Removes a single entry. Removing an absent key is not an error.
    fn delete(&self, ns: &str, key: &[u8]) -> Result<(), StoreError>;

    /// Returns the entries of `ns` with `min_key <= key <= max_key` that
    /// satisfy `cond`. An empty bound is unbounded on that side.
    fn filter(
        &self,
        ns: &str,
        cond: Condition<'_>,
        min_key: &[u8],
        max_key: &[u8],
    ) -> Result<KvPairs, StoreError>;

    /// Applies every entry of `batch` atomically, in order.
    fn write_batch(&self, batch: &Batch) -> Result<(), StoreError>;
}

/// Returns `true` if `key` lies within the inclusive `[min_key, max_key]`
/// range, treating empty bounds as open.
pub(crate) fn in_range(key: &[u8], min_key: &[u8], max_key: &[u8]) -> bool {
    (min_key.is_empty() || key >= min_key) && (max_key.is_empty() || key <= max_key)
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn start(&self) -> Result<(), StoreError> {
        (**self).start()
    }

    fn stop(&self) -> Result<(), StoreError> {
        (**self).stop()
    }

    fn get(&self, ns: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(ns, key)
    }

    fn put(&self, ns: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        (**self).put(ns, key, value)
    }

    fn delete(&self, ns: &str, key: &[u8]) -> Result<(), StoreError> {
        (**self).delete(ns, key)
    }

    fn filter(
        &self,
        ns: &str,
        cond: Condition<'_>,
        min_key: &[u8],
        max_key: &[u8],
    ) -> Result<KvPairs, StoreError> {
        (**self).filter(ns, cond, min_key, max_key)
    }

    fn write_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        (**self).write_batch(batch)
    }
}
