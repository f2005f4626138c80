//! Buffered key-value store.
//!
//! [`KvStoreWithBuffer`] wraps a [`KvStore`] with an in-memory write buffer
//! so that a caller can stage many writes, read them back, take nested
//! snapshots and revert, all without touching the underlying store. A
//! [`KvStoreFlusher`] owns the buffered store and is the only way to push
//! the buffer down as one atomic batch.
//!
//! Reads are buffer-shadowed: the latest buffered write for a key wins
//! over the store, and a buffered delete hides the key even if the store
//! still has it.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::batch::{
    Batch, BufferLookup, CachedBatch, WriteInfoFilter, WriteInfoSerialize, WriteInfoTranslate,
    WriteType,
};
use super::kv::{Condition, KvPairs, KvStore, StoreError, in_range};

/// [`KvStore`] with a write buffer supporting snapshot and revert.
pub struct KvStoreWithBuffer<S> {
    store: S,
    buffer: Mutex<CachedBatch>,
}

impl<S: KvStore> KvStoreWithBuffer<S> {
    /// Wraps `store` with an empty buffer.
    pub fn new(store: S) -> Self {
        Self::with_buffer(store, CachedBatch::new())
    }

    /// Wraps `store` with a pre-populated buffer.
    pub fn with_buffer(store: S, buffer: CachedBatch) -> Self {
        Self {
            store,
            buffer: Mutex::new(buffer),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Buffers a put. Never touches the store.
    pub fn must_put(&self, ns: &str, key: &[u8], value: &[u8]) {
        self.buffer.lock().put(ns, key, value);
    }

    /// Buffers a delete. Never touches the store.
    pub fn must_delete(&self, ns: &str, key: &[u8]) {
        self.buffer.lock().delete(ns, key);
    }

    pub fn snapshot(&self) -> usize {
        self.buffer.lock().snapshot()
    }

    pub fn revert_snapshot(&self, id: usize) -> Result<(), StoreError> {
        self.buffer.lock().revert_snapshot(id)
    }

    pub fn reset_snapshots(&self) {
        self.buffer.lock().reset_snapshots();
    }

    /// Number of buffered entries.
    pub fn size(&self) -> usize {
        self.buffer.lock().size()
    }

    pub fn serialize_queue(
        &self,
        serialize: Option<&WriteInfoSerialize>,
        filter: Option<&WriteInfoFilter>,
    ) -> Vec<u8> {
        self.buffer.lock().serialize_queue(serialize, filter)
    }

    /// Writes the buffer to the store and clears it, holding the buffer
    /// lock throughout. The buffer is left intact if the write fails.
    fn flush(&self, translate: Option<&WriteInfoTranslate>) -> Result<usize, StoreError> {
        let mut buffer = self.buffer.lock();
        let batch = buffer.translate(translate);
        self.store.write_batch(&batch)?;
        let flushed = buffer.size();
        buffer.clear();
        Ok(flushed)
    }
}

impl<S: KvStore> KvStore for KvStoreWithBuffer<S> {
    fn start(&self) -> Result<(), StoreError> {
        self.store.start()
    }

    fn stop(&self) -> Result<(), StoreError> {
        self.store.stop()
    }

    fn get(&self, ns: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self.buffer.lock().get(ns, key) {
            BufferLookup::Found(v) => return Ok(Some(v.to_vec())),
            BufferLookup::Deleted => return Ok(None),
            BufferLookup::Missing => {}
        }
        self.store.get(ns, key)
    }

    fn put(&self, ns: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.must_put(ns, key, value);
        Ok(())
    }

    fn delete(&self, ns: &str, key: &[u8]) -> Result<(), StoreError> {
        self.must_delete(ns, key);
        Ok(())
    }

    /// Merges store hits with the buffer.
    ///
    /// A buffered put replaces any store hit for the same key and is kept
    /// only if it satisfies `cond`; a buffered delete removes the key.
    fn filter(
        &self,
        ns: &str,
        cond: Condition<'_>,
        min_key: &[u8],
        max_key: &[u8],
    ) -> Result<KvPairs, StoreError> {
        let found = self.store.filter(ns, cond, min_key, max_key)?;
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = found.into_iter().collect();

        let buffer = self.buffer.lock();
        for entry in buffer.entries() {
            if entry.namespace() != ns || !in_range(entry.key(), min_key, max_key) {
                continue;
            }
            merged.remove(entry.key());
            if entry.write_type() == WriteType::Put && cond(entry.key(), entry.value()) {
                merged.insert(entry.key().to_vec(), entry.value().to_vec());
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Appends the batch to the buffer; nothing reaches the store.
    fn write_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        self.buffer.lock().append(batch);
        Ok(())
    }
}

/// Pluggable behaviour of a [`KvStoreFlusher`].
#[derive(Clone, Default)]
pub struct FlusherOptions {
    /// Entries for which this returns `true` are left out of
    /// [`KvStoreFlusher::serialize_queue`].
    pub serialize_filter: Option<WriteInfoFilter>,
    /// Replaces the default per-entry serialization.
    pub serialize: Option<WriteInfoSerialize>,
    /// Applied to every entry before [`KvStoreFlusher::flush`] writes it.
    pub flush_translate: Option<WriteInfoTranslate>,
}

/// Owner of a [`KvStoreWithBuffer`] that can flush it to the base store.
pub struct KvStoreFlusher<S> {
    kvb: Arc<KvStoreWithBuffer<S>>,
    opts: FlusherOptions,
}

impl<S: KvStore> KvStoreFlusher<S> {
    pub fn new(store: S, opts: FlusherOptions) -> Self {
        Self::with_buffer(store, CachedBatch::new(), opts)
    }

    pub fn with_buffer(store: S, buffer: CachedBatch, opts: FlusherOptions) -> Self {
        Self {
            kvb: Arc::new(KvStoreWithBuffer::with_buffer(store, buffer)),
            opts,
        }
    }

    /// Serialized buffer contents, using the configured filter and
    /// serialization.
    pub fn serialize_queue(&self) -> Vec<u8> {
        self.kvb
            .serialize_queue(self.opts.serialize.as_ref(), self.opts.serialize_filter.as_ref())
    }

    /// Atomically writes the buffer to the base store and clears it.
    pub fn flush(&self) -> Result<(), StoreError> {
        let flushed = self.kvb.flush(self.opts.flush_translate.as_ref())?;
        debug!(entries = flushed, "flushed write buffer");
        Ok(())
    }

    /// Shared handle to the buffered store.
    pub fn kv_store_with_buffer(&self) -> Arc<KvStoreWithBuffer<S>> {
        Arc::clone(&self.kvb)
    }

    pub fn base_kv_store(&self) -> &S {
        self.kvb.store()
    }
}
