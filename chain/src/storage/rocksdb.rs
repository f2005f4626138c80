//! RocksDB-backed key-value store.
//!
//! Every namespace maps to a dedicated column family. Column families that
//! already exist on disk are opened with the database; new namespaces get
//! their column family created on first write. Batches are applied through
//! a single RocksDB `WriteBatch`, which gives the atomicity required by
//! [`KvStore::write_batch`].

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use serde::Deserialize;
use tracing::debug;

use super::batch::{Batch, WriteType};
use super::kv::{Condition, KvPairs, KvStore, StoreError};

type Db = DBWithThreadMode<MultiThreaded>;

/// Configuration for [`RocksDbKvStore`].
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database if it does not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/chain-db".to_string(),
            create_if_missing: true,
        }
    }
}

/// RocksDB-backed implementation of [`KvStore`].
pub struct RocksDbKvStore {
    db: Db,
}

impl RocksDbKvStore {
    /// Opens (or creates) a RocksDB database at the configured path,
    /// together with every column family already present on disk.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StoreError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(true);

        // A fresh directory has no column families to list yet.
        let mut names = Db::list_cf(&opts, path).unwrap_or_default();
        if !names.iter().any(|n| n == "default") {
            names.push("default".to_string());
        }
        let cfs = names
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = Db::open_cf_descriptors(&opts, path, cfs)?;
        debug!(path = %cfg.path, "opened rocksdb store");
        Ok(Self { db })
    }

    fn cf(&self, ns: &str) -> Option<Arc<BoundColumnFamily<'_>>> {
        self.db.cf_handle(ns)
    }

    fn cf_or_create(&self, ns: &str) -> Result<Arc<BoundColumnFamily<'_>>, StoreError> {
        if let Some(cf) = self.db.cf_handle(ns) {
            return Ok(cf);
        }
        self.db.create_cf(ns, &Options::default())?;
        self.db
            .cf_handle(ns)
            .ok_or_else(|| StoreError::Backend(format!("column family {ns} missing after create")))
    }
}

impl KvStore for RocksDbKvStore {
    fn start(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn get(&self, ns: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(cf) = self.cf(ns) else {
            return Ok(None);
        };
        Ok(self.db.get_cf(&cf, key)?)
    }

    fn put(&self, ns: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let cf = self.cf_or_create(ns)?;
        self.db.put_cf(&cf, key, value)?;
        Ok(())
    }

    fn delete(&self, ns: &str, key: &[u8]) -> Result<(), StoreError> {
        let Some(cf) = self.cf(ns) else {
            return Ok(());
        };
        self.db.delete_cf(&cf, key)?;
        Ok(())
    }

    fn filter(
        &self,
        ns: &str,
        cond: Condition<'_>,
        min_key: &[u8],
        max_key: &[u8],
    ) -> Result<KvPairs, StoreError> {
        let Some(cf) = self.cf(ns) else {
            return Ok(Vec::new());
        };
        let mode = if min_key.is_empty() {
            IteratorMode::Start
        } else {
            IteratorMode::From(min_key, Direction::Forward)
        };

        let mut out = Vec::new();
        for item in self.db.iterator_cf(&cf, mode) {
            let (k, v) = item?;
            if !max_key.is_empty() && &*k > max_key {
                break;
            }
            if cond(&k, &v) {
                out.push((k.into_vec(), v.into_vec()));
            }
        }
        Ok(out)
    }

    fn write_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        let mut wb = WriteBatch::default();
        for entry in batch.iter() {
            let cf = self.cf_or_create(entry.namespace())?;
            match entry.write_type() {
                WriteType::Put => wb.put_cf(&cf, entry.key(), entry.value()),
                WriteType::Delete => wb.delete_cf(&cf, entry.key()),
            }
        }
        self.db.write(wb)?;
        Ok(())
    }
}
