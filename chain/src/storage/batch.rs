//! Write batches and the snapshot-capable write buffer.
//!
//! - [`Batch`] is a plain ordered list of writes applied atomically by a
//!   [`crate::storage::KvStore`],
//! - [`CachedBatch`] is the in-memory buffer behind
//!   [`crate::storage::KvStoreWithBuffer`]: an append-only log where later
//!   entries shadow earlier ones, plus a stack of snapshot markers.

use std::sync::Arc;

use super::kv::StoreError;

/// Kind of a buffered write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteType {
    Put,
    Delete,
}

impl WriteType {
    fn tag(self) -> u8 {
        match self {
            WriteType::Put => 0,
            WriteType::Delete => 1,
        }
    }
}

/// A single namespaced write. Deletes carry an empty value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteInfo {
    write_type: WriteType,
    namespace: String,
    key: Vec<u8>,
    value: Vec<u8>,
}

impl WriteInfo {
    pub fn put(ns: &str, key: &[u8], value: &[u8]) -> Self {
        Self {
            write_type: WriteType::Put,
            namespace: ns.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    pub fn delete(ns: &str, key: &[u8]) -> Self {
        Self {
            write_type: WriteType::Delete,
            namespace: ns.to_string(),
            key: key.to_vec(),
            value: Vec::new(),
        }
    }

    pub fn write_type(&self) -> WriteType {
        self.write_type
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Default serialization: write type tag, namespace, key, value.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(1 + self.namespace.len() + self.key.len() + self.value.len());
        out.push(self.write_type.tag());
        out.extend_from_slice(self.namespace.as_bytes());
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&self.value);
        out
    }
}

/// Returns `true` for entries that must be skipped when serializing.
pub type WriteInfoFilter = Arc<dyn Fn(&WriteInfo) -> bool + Send + Sync>;

/// Custom serialization of a single entry.
pub type WriteInfoSerialize = Arc<dyn Fn(&WriteInfo) -> Vec<u8> + Send + Sync>;

/// Rewrites an entry before it is flushed; `None` drops it.
pub type WriteInfoTranslate = Arc<dyn Fn(&WriteInfo) -> Option<WriteInfo> + Send + Sync>;

/// Ordered list of writes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Batch {
    entries: Vec<WriteInfo>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, ns: &str, key: &[u8], value: &[u8]) {
        self.entries.push(WriteInfo::put(ns, key, value));
    }

    pub fn delete(&mut self, ns: &str, key: &[u8]) {
        self.entries.push(WriteInfo::delete(ns, key));
    }

    /// Appends all entries of `other` after the entries of `self`.
    pub fn append(&mut self, other: &Batch) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WriteInfo> {
        self.entries.iter()
    }

    /// Returns a copy with `translate` applied to every entry.
    pub fn translate(&self, translate: Option<&WriteInfoTranslate>) -> Batch {
        let Some(f) = translate else {
            return self.clone();
        };
        Batch {
            entries: self.entries.iter().filter_map(|e| f(e)).collect(),
        }
    }
}

/// Result of looking a key up in the write buffer.
#[derive(Debug, Eq, PartialEq)]
pub enum BufferLookup<'a> {
    /// The latest buffered write is a put of this value.
    Found(&'a [u8]),
    /// The latest buffered write is a delete.
    Deleted,
    /// The buffer holds no write for the key.
    Missing,
}

/// Write buffer with nested snapshots.
///
/// A snapshot is the buffer length at the time it was taken. Reverting
/// to snapshot `id` truncates the log back to that length and discards
/// every snapshot taken after `id`; `id` itself stays valid.
#[derive(Clone, Debug, Default)]
pub struct CachedBatch {
    queue: Vec<WriteInfo>,
    snapshots: Vec<usize>,
}

impl CachedBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, ns: &str, key: &[u8], value: &[u8]) {
        self.queue.push(WriteInfo::put(ns, key, value));
    }

    pub fn delete(&mut self, ns: &str, key: &[u8]) {
        self.queue.push(WriteInfo::delete(ns, key));
    }

    pub fn append(&mut self, batch: &Batch) {
        self.queue.extend(batch.iter().cloned());
    }

    /// Latest buffered write for `(ns, key)`.
    pub fn get(&self, ns: &str, key: &[u8]) -> BufferLookup<'_> {
        match self
            .queue
            .iter()
            .rev()
            .find(|e| e.namespace == ns && e.key == key)
        {
            Some(e) if e.write_type == WriteType::Put => BufferLookup::Found(&e.value),
            Some(_) => BufferLookup::Deleted,
            None => BufferLookup::Missing,
        }
    }

    /// Number of buffered entries.
    pub fn size(&self) -> usize {
        self.queue.len()
    }

    pub fn entry(&self, index: usize) -> Option<&WriteInfo> {
        self.queue.get(index)
    }

    pub fn entries(&self) -> &[WriteInfo] {
        &self.queue
    }

    /// Records the current buffer length and returns its snapshot id.
    pub fn snapshot(&mut self) -> usize {
        self.snapshots.push(self.queue.len());
        self.snapshots.len() - 1
    }

    /// Discards every write made after snapshot `id` was taken.
    pub fn revert_snapshot(&mut self, id: usize) -> Result<(), StoreError> {
        let len = *self
            .snapshots
            .get(id)
            .ok_or(StoreError::InvalidSnapshot(id))?;
        self.queue.truncate(len);
        self.snapshots.truncate(id + 1);
        Ok(())
    }

    /// Forgets all snapshots, keeping the buffered writes.
    pub fn reset_snapshots(&mut self) {
        self.snapshots.clear();
    }

    /// Drops every buffered write and snapshot.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.snapshots.clear();
    }

    /// Buffered writes as a [`Batch`], with `translate` applied.
    pub fn translate(&self, translate: Option<&WriteInfoTranslate>) -> Batch {
        let entries = match translate {
            Some(f) => self.queue.iter().filter_map(|e| f(e)).collect(),
            None => self.queue.clone(),
        };
        Batch { entries }
    }

    /// Concatenated serialization of the buffered writes, skipping entries
    /// for which `filter` returns `true`.
    pub fn serialize_queue(
        &self,
        serialize: Option<&WriteInfoSerialize>,
        filter: Option<&WriteInfoFilter>,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.queue {
            if filter.is_some_and(|skip| skip(entry)) {
                continue;
            }
            match serialize {
                Some(f) => out.extend(f(entry)),
                None => out.extend(entry.serialize()),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_writes_shadow_earlier_ones() {
        let mut cb = CachedBatch::new();
        cb.put("ns", b"k", b"v1");
        cb.put("ns", b"k", b"v2");
        assert_eq!(cb.get("ns", b"k"), BufferLookup::Found(b"v2"));

        cb.delete("ns", b"k");
        assert_eq!(cb.get("ns", b"k"), BufferLookup::Deleted);
        assert_eq!(cb.get("other", b"k"), BufferLookup::Missing);
    }

    #[test]
    fn nested_snapshots_revert_in_order() {
        let mut cb = CachedBatch::new();
        cb.put("ns", b"a", b"1");
        let s1 = cb.snapshot();
        cb.put("ns", b"b", b"2");
        let s2 = cb.snapshot();
        cb.put("ns", b"c", b"3");

        cb.revert_snapshot(s1).expect("revert to s1");
        assert_eq!(cb.size(), 1);
        assert_eq!(cb.get("ns", b"b"), BufferLookup::Missing);
        assert!(matches!(
            cb.revert_snapshot(s2),
            Err(StoreError::InvalidSnapshot(_))
        ));

        // s1 survives its own revert
        cb.put("ns", b"d", b"4");
        cb.revert_snapshot(s1).expect("revert to s1 again");
        assert_eq!(cb.size(), 1);
    }

    #[test]
    fn reset_snapshots_keeps_writes() {
        let mut cb = CachedBatch::new();
        let s = cb.snapshot();
        cb.put("ns", b"a", b"1");
        cb.reset_snapshots();
        assert!(cb.revert_snapshot(s).is_err());
        assert_eq!(cb.size(), 1);
    }

    #[test]
    fn serialize_queue_honours_filter_and_custom_encoding() {
        let mut cb = CachedBatch::new();
        cb.put("ns", b"k", b"v");
        cb.delete("skip", b"x");

        let default = cb.serialize_queue(None, None);
        assert_eq!(&default[..5], &[0, b'n', b's', b'k', b'v']);
        assert_eq!(&default[5..], &[1, b's', b'k', b'i', b'p', b'x']);

        let filter: WriteInfoFilter = Arc::new(|e: &WriteInfo| e.namespace() == "skip");
        let keys_only: WriteInfoSerialize = Arc::new(|e: &WriteInfo| e.key().to_vec());
        assert_eq!(cb.serialize_queue(Some(&keys_only), Some(&filter)), b"k");
    }

    #[test]
    fn translate_can_drop_and_rewrite_entries() {
        let mut cb = CachedBatch::new();
        cb.put("ns", b"keep", b"1");
        cb.put("tmp", b"drop", b"2");

        let translate: WriteInfoTranslate = Arc::new(|e: &WriteInfo| {
            (e.namespace() != "tmp").then(|| WriteInfo::put("moved", e.key(), e.value()))
        });
        let batch = cb.translate(Some(&translate));
        assert_eq!(batch.len(), 1);
        let only = batch.iter().next().expect("one entry");
        assert_eq!(only.namespace(), "moved");
        assert_eq!(only.key(), b"keep");
    }
}
