//! In-memory key-value store.
//!
//! This implementation is useful for unit tests, benchmarks, and small
//! devnets. It keeps every namespace in its own ordered `BTreeMap` so that
//! range scans behave like the RocksDB backend. Tests can inject read and
//! write failures and start cancellation to exercise error paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::batch::{Batch, WriteType};
use super::kv::{Condition, KvPairs, KvStore, StoreError, in_range};

type Namespaces = BTreeMap<String, BTreeMap<Vec<u8>, Vec<u8>>>;

/// In-memory implementation of [`KvStore`].
#[derive(Default)]
pub struct MemKvStore {
    data: RwLock<Namespaces>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    cancel_start: AtomicBool,
}

impl MemKvStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `get` and `filter` fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent [`KvStore::start`] report cancellation.
    pub fn cancel_start(&self, cancel: bool) {
        self.cancel_start.store(cancel, Ordering::SeqCst);
    }

    /// Returns the number of entries stored in `ns`.
    pub fn len(&self, ns: &str) -> usize {
        self.data.read().get(ns).map_or(0, BTreeMap::len)
    }

    fn check_readable(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected read failure".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl KvStore for MemKvStore {
    fn start(&self) -> Result<(), StoreError> {
        if self.cancel_start.load(Ordering::SeqCst) {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn get(&self, ns: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_readable()?;
        Ok(self.data.read().get(ns).and_then(|m| m.get(key)).cloned())
    }

    fn put(&self, ns: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.data
            .write()
            .entry(ns.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, ns: &str, key: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        if let Some(m) = self.data.write().get_mut(ns) {
            m.remove(key);
        }
        Ok(())
    }

    fn filter(
        &self,
        ns: &str,
        cond: Condition<'_>,
        min_key: &[u8],
        max_key: &[u8],
    ) -> Result<KvPairs, StoreError> {
        self.check_readable()?;
        let data = self.data.read();
        let Some(m) = data.get(ns) else {
            return Ok(Vec::new());
        };
        Ok(m.iter()
            .filter(|(k, v)| in_range(k, min_key, max_key) && cond(k, v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut data = self.data.write();
        for entry in batch.iter() {
            let m = data.entry(entry.namespace().to_string()).or_default();
            match entry.write_type() {
                WriteType::Put => {
                    m.insert(entry.key().to_vec(), entry.value().to_vec());
                }
                WriteType::Delete => {
                    m.remove(entry.key());
                }
            }
        }
        Ok(())
    }
}
