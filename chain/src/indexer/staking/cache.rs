//! In-memory staking index and its per-block delta.
//!
//! Persisted layout:
//!
//! - `"staking_bucket_type"`: type id (8-byte big endian) -> [`BucketType`],
//! - `"staking_bucket_info"`: bucket id -> [`BucketInfo`],
//! - `"staking_meta"`: total bucket count under `"total_bucket_count"`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::de::DeserializeOwned;

use super::bucket::{Bucket, BucketInfo, BucketType};
use super::events::StakingEventHandler;
use crate::indexer::{IndexCache, IndexerError};
use crate::storage::KvStore;
use crate::types::{Address, canonical_decode};

pub(crate) const NS_BUCKET_TYPE: &str = "staking_bucket_type";
pub(crate) const NS_BUCKET_INFO: &str = "staking_bucket_info";
pub(crate) const NS_META: &str = "staking_meta";
pub(crate) const TOTAL_COUNT_KEY: &[u8] = b"total_bucket_count";

/// Changes produced by one block.
///
/// `buckets` maps to `None` for withdrawn buckets.
#[derive(Debug, Default)]
pub struct StakingDelta {
    pub(crate) bucket_types: BTreeMap<u64, BucketType>,
    pub(crate) buckets: BTreeMap<u64, Option<BucketInfo>>,
    pub(crate) total_bucket_count: u64,
}

/// Staking positions and bucket types as of the last merged block.
#[derive(Clone, Debug, Default)]
pub struct StakingCache {
    height: u64,
    bucket_types: BTreeMap<u64, BucketType>,
    type_ids: HashMap<(u128, u64), u64>,
    buckets: BTreeMap<u64, BucketInfo>,
    candidate_buckets: HashMap<Address, BTreeSet<u64>>,
    total_bucket_count: u64,
}

impl StakingCache {
    pub fn bucket_info(&self, id: u64) -> Option<&BucketInfo> {
        self.buckets.get(&id)
    }

    pub fn bucket_type(&self, id: u64) -> Option<&BucketType> {
        self.bucket_types.get(&id)
    }

    pub fn type_id(&self, amount: u128, duration: u64) -> Option<u64> {
        self.type_ids.get(&(amount, duration)).copied()
    }

    /// Type ids are dense, starting from 0.
    pub fn next_type_id(&self) -> u64 {
        self.bucket_types.len() as u64
    }

    /// Buckets ever created, including withdrawn ones.
    pub fn total_bucket_count(&self) -> u64 {
        self.total_bucket_count
    }

    pub fn bucket(&self, id: u64, contract: Address) -> Option<Bucket> {
        let info = self.buckets.get(&id)?;
        let bt = self.bucket_types.get(&info.type_index)?;
        Some(Bucket::assemble(id, info, bt, contract))
    }

    /// All live buckets, ordered by id.
    pub fn buckets(&self, contract: Address) -> Vec<Bucket> {
        self.buckets
            .keys()
            .filter_map(|id| self.bucket(*id, contract))
            .collect()
    }

    /// Buckets for the given ids, skipping unknown ones.
    pub fn buckets_by_indices(&self, ids: &[u64], contract: Address) -> Vec<Bucket> {
        ids.iter()
            .filter_map(|id| self.bucket(*id, contract))
            .collect()
    }

    pub fn buckets_by_candidate(&self, candidate: &Address, contract: Address) -> Vec<Bucket> {
        self.candidate_buckets
            .get(candidate)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.bucket(*id, contract))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn buckets_by_owner(&self, owner: &Address, contract: Address) -> Vec<Bucket> {
        self.buckets(contract)
            .into_iter()
            .filter(|b| b.owner == *owner)
            .collect()
    }

    pub fn active_bucket_types(&self) -> Vec<BucketType> {
        self.bucket_types
            .values()
            .filter(|bt| bt.is_active())
            .cloned()
            .collect()
    }

    /// Summed vote weight of the candidate's buckets that are still staked.
    pub fn candidate_votes(
        &self,
        candidate: &Address,
        contract: Address,
        weight: &dyn Fn(&Bucket) -> u128,
    ) -> u128 {
        self.buckets_by_candidate(candidate, contract)
            .iter()
            .filter(|b| !b.is_unstaked())
            .fold(0u128, |acc, b| acc.saturating_add(weight(b)))
    }

    fn put_bucket_type(&mut self, id: u64, bt: BucketType) {
        if let Some(old) = self.bucket_types.get(&id) {
            self.type_ids.remove(&(old.amount, old.duration));
        }
        self.type_ids.insert((bt.amount, bt.duration), id);
        self.bucket_types.insert(id, bt);
    }

    fn put_bucket_info(&mut self, id: u64, info: BucketInfo) {
        self.unlink_candidate(id);
        self.candidate_buckets
            .entry(info.delegate)
            .or_default()
            .insert(id);
        self.buckets.insert(id, info);
    }

    fn delete_bucket_info(&mut self, id: u64) {
        self.unlink_candidate(id);
        self.buckets.remove(&id);
    }

    fn unlink_candidate(&mut self, id: u64) {
        let Some(old) = self.buckets.get(&id) else {
            return;
        };
        if let Some(ids) = self.candidate_buckets.get_mut(&old.delegate) {
            ids.remove(&id);
            if ids.is_empty() {
                self.candidate_buckets.remove(&old.delegate);
            }
        }
    }
}

impl IndexCache for StakingCache {
    type Handler = StakingEventHandler;

    fn height(&self) -> u64 {
        self.height
    }

    fn new_handler(&self) -> StakingEventHandler {
        StakingEventHandler::new(self)
    }

    fn merge(&mut self, delta: StakingDelta, height: u64) -> Result<(), IndexerError> {
        for (id, info) in &delta.buckets {
            let Some(info) = info else { continue };
            if !self.bucket_types.contains_key(&info.type_index)
                && !delta.bucket_types.contains_key(&info.type_index)
            {
                return Err(IndexerError::Merge {
                    height,
                    reason: format!("bucket {id} refers to unknown type {}", info.type_index),
                });
            }
        }

        for (id, bt) in delta.bucket_types {
            self.put_bucket_type(id, bt);
        }
        for (id, info) in delta.buckets {
            match info {
                Some(info) => self.put_bucket_info(id, info),
                None => self.delete_bucket_info(id),
            }
        }
        self.total_bucket_count = delta.total_bucket_count;
        self.height = height;
        Ok(())
    }

    fn load<S: KvStore + ?Sized>(store: &S, height: u64) -> Result<Self, IndexerError> {
        let mut cache = StakingCache {
            height,
            ..StakingCache::default()
        };
        for (id, bt) in load_all::<_, BucketType>(store, NS_BUCKET_TYPE)? {
            cache.put_bucket_type(id, bt);
        }
        for (id, info) in load_all::<_, BucketInfo>(store, NS_BUCKET_INFO)? {
            cache.put_bucket_info(id, info);
        }
        if let Some(bytes) = store.get(NS_META, TOTAL_COUNT_KEY)? {
            cache.total_bucket_count = decode_id(&bytes)?;
        }
        Ok(cache)
    }
}

fn load_all<S: KvStore + ?Sized, T: DeserializeOwned>(
    store: &S,
    ns: &str,
) -> Result<Vec<(u64, T)>, IndexerError> {
    let all = |_: &[u8], _: &[u8]| true;
    store
        .filter(ns, &all, &[], &[])?
        .into_iter()
        .map(|(k, v)| {
            let value = canonical_decode(&v)
                .map_err(|e| IndexerError::Corrupted(format!("{ns}: {e}")))?;
            Ok((decode_id(&k)?, value))
        })
        .collect()
}

fn decode_id(bytes: &[u8]) -> Result<u64, IndexerError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| IndexerError::Corrupted(format!("id of length {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}
