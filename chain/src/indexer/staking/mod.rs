//! Contract staking index.
//!
//! Tracks buckets (staking positions) and bucket types of the system
//! staking contract from its events, and answers point-in-time queries
//! used by the voting protocol. Queries for heights before the contract
//! deployment return empty results instead of errors.

pub mod bucket;
pub mod cache;
pub mod events;

use std::fmt;
use std::sync::Arc;

use super::{IncrementalIndexer, IndexerConfig, IndexerError};
use crate::consensus::error::SubscriberError;
use crate::consensus::subscriber::BlockSubscriber;
use crate::storage::KvStore;
use crate::types::{Address, Block};

pub use bucket::{Bucket, BucketInfo, BucketType, MAX_HEIGHT};
pub use cache::{StakingCache, StakingDelta};
pub use events::{StakingEventHandler, event_topic};

/// Namespace of the staking checkpoint.
pub const STAKING_NAMESPACE: &str = "contract_staking";

/// Vote weight of a single bucket.
pub type VoteWeightFn = Arc<dyn Fn(&Bucket) -> u128 + Send + Sync>;

/// Construction parameters of a [`StakingIndexer`].
#[derive(Clone)]
pub struct StakingIndexerConfig {
    /// Hex address of the staking contract.
    pub contract_address: String,
    /// Height the contract was deployed at.
    pub deploy_height: u64,
    pub vote_weight: VoteWeightFn,
}

impl fmt::Debug for StakingIndexerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StakingIndexerConfig")
            .field("contract_address", &self.contract_address)
            .field("deploy_height", &self.deploy_height)
            .finish_non_exhaustive()
    }
}

/// Staking index driven by committed blocks.
pub struct StakingIndexer<S> {
    inner: IncrementalIndexer<S, StakingCache>,
    vote_weight: VoteWeightFn,
}

impl<S: KvStore> StakingIndexer<S> {
    /// Fails if the contract address does not parse.
    pub fn new(store: S, config: StakingIndexerConfig) -> Result<Self, IndexerError> {
        let contract_address = Address::from_hex(&config.contract_address).map_err(|e| {
            IndexerError::Config(format!(
                "invalid contract address {}: {e}",
                config.contract_address
            ))
        })?;
        Ok(Self {
            inner: IncrementalIndexer::new(
                store,
                IndexerConfig {
                    namespace: STAKING_NAMESPACE.to_string(),
                    start_height: config.deploy_height,
                    contract_address,
                },
            ),
            vote_weight: config.vote_weight,
        })
    }

    pub fn start(&self) -> Result<(), IndexerError> {
        self.inner.start()
    }

    pub fn stop(&self) -> Result<(), IndexerError> {
        self.inner.stop()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    pub fn height(&self) -> u64 {
        self.inner.height()
    }

    pub fn start_height(&self) -> u64 {
        self.inner.start_height()
    }

    pub fn contract_address(&self) -> Address {
        self.inner.contract_address()
    }

    pub fn put_block(&self, block: &Block) -> Result<(), IndexerError> {
        self.inner.put_block(block)
    }

    /// Independent snapshot of the index for long-running queries.
    pub fn start_view(&self) -> Result<StakingView, IndexerError> {
        let cache = self.inner.start_view()?;
        Ok(StakingView {
            height: crate::indexer::IndexCache::height(&cache),
            cache,
            contract_address: self.contract_address(),
            vote_weight: Arc::clone(&self.vote_weight),
        })
    }

    pub fn buckets(&self, height: u64) -> Result<Vec<Bucket>, IndexerError> {
        let contract = self.contract_address();
        Ok(self
            .inner
            .read(height, |c| c.buckets(contract))?
            .unwrap_or_default())
    }

    pub fn bucket(&self, id: u64, height: u64) -> Result<Option<Bucket>, IndexerError> {
        let contract = self.contract_address();
        Ok(self.inner.read(height, |c| c.bucket(id, contract))?.flatten())
    }

    pub fn buckets_by_indices(&self, ids: &[u64], height: u64) -> Result<Vec<Bucket>, IndexerError> {
        let contract = self.contract_address();
        Ok(self
            .inner
            .read(height, |c| c.buckets_by_indices(ids, contract))?
            .unwrap_or_default())
    }

    pub fn buckets_by_candidate(
        &self,
        candidate: &Address,
        height: u64,
    ) -> Result<Vec<Bucket>, IndexerError> {
        let contract = self.contract_address();
        Ok(self
            .inner
            .read(height, |c| c.buckets_by_candidate(candidate, contract))?
            .unwrap_or_default())
    }

    pub fn buckets_by_owner(&self, owner: &Address, height: u64) -> Result<Vec<Bucket>, IndexerError> {
        let contract = self.contract_address();
        Ok(self
            .inner
            .read(height, |c| c.buckets_by_owner(owner, contract))?
            .unwrap_or_default())
    }

    /// Buckets ever created, including withdrawn ones.
    pub fn total_bucket_count(&self, height: u64) -> Result<u64, IndexerError> {
        Ok(self
            .inner
            .read(height, |c| c.total_bucket_count())?
            .unwrap_or_default())
    }

    /// Currently active bucket types.
    pub fn bucket_types(&self, height: u64) -> Result<Vec<BucketType>, IndexerError> {
        Ok(self
            .inner
            .read(height, |c| c.active_bucket_types())?
            .unwrap_or_default())
    }

    pub fn candidate_votes(&self, candidate: &Address, height: u64) -> Result<u128, IndexerError> {
        let contract = self.contract_address();
        let weight = self.vote_weight.as_ref();
        Ok(self
            .inner
            .read(height, |c| c.candidate_votes(candidate, contract, weight))?
            .unwrap_or_default())
    }
}

impl<S: KvStore> BlockSubscriber for StakingIndexer<S> {
    fn name(&self) -> &str {
        STAKING_NAMESPACE
    }

    fn receive_block(&self, block: &Block) -> Result<(), SubscriberError> {
        self.inner.receive_block(block)
    }
}

/// Point-in-time copy of the staking index.
#[derive(Clone)]
pub struct StakingView {
    height: u64,
    cache: StakingCache,
    contract_address: Address,
    vote_weight: VoteWeightFn,
}

impl StakingView {
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn buckets(&self) -> Vec<Bucket> {
        self.cache.buckets(self.contract_address)
    }

    pub fn bucket(&self, id: u64) -> Option<Bucket> {
        self.cache.bucket(id, self.contract_address)
    }

    pub fn buckets_by_candidate(&self, candidate: &Address) -> Vec<Bucket> {
        self.cache.buckets_by_candidate(candidate, self.contract_address)
    }

    pub fn candidate_votes(&self, candidate: &Address) -> u128 {
        self.cache
            .candidate_votes(candidate, self.contract_address, self.vote_weight.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::events::TOPICS;
    use super::events::abi::*;
    use super::*;
    use crate::storage::MemKvStore;
    use crate::test_utils::producer_key;
    use crate::types::{BlockBuilder, Hash256, Log, Receipt, ReceiptStatus};

    const CONTRACT: Address = Address([9u8; 20]);
    const OWNER: Address = Address([0xaa; 20]);
    const DELEGATE: Address = Address([0xdd; 20]);

    fn config(deploy_height: u64) -> StakingIndexerConfig {
        StakingIndexerConfig {
            contract_address: CONTRACT.to_string(),
            deploy_height,
            vote_weight: Arc::new(|b: &Bucket| b.staked_amount * 2),
        }
    }

    fn indexer(deploy_height: u64) -> StakingIndexer<Arc<MemKvStore>> {
        let idx = StakingIndexer::new(Arc::new(MemKvStore::new()), config(deploy_height))
            .expect("construct indexer");
        idx.start().expect("start");
        idx
    }

    fn block(height: u64, logs: Vec<Log>) -> Block {
        let receipt = Receipt {
            status: ReceiptStatus::Success,
            block_height: height,
            action_hash: Hash256::ZERO,
            gas_used: 0,
            blob_gas_used: 0,
            logs,
        };
        BlockBuilder::new(height, Hash256::ZERO, 0)
            .receipts(vec![receipt])
            .sign_and_build(&producer_key())
    }

    fn staking_block(height: u64) -> Block {
        let mut logs = vec![bucket_type_activated(CONTRACT, 100, 10)];
        logs.extend(stake(CONTRACT, 1, OWNER, DELEGATE, 100, 10));
        logs.extend(stake(CONTRACT, 2, OWNER, DELEGATE, 100, 10));
        block(height, logs)
    }

    #[test]
    fn invalid_contract_address_fails_construction() {
        let cfg = StakingIndexerConfig {
            contract_address: "not-an-address".into(),
            ..config(0)
        };
        assert!(matches!(
            StakingIndexer::new(MemKvStore::new(), cfg),
            Err(IndexerError::Config(_))
        ));
    }

    #[test]
    fn deploy_height_scenario() {
        let idx = indexer(100);
        idx.put_block(&staking_block(100)).expect("block 100");

        assert_eq!(idx.height(), 100);
        assert!(idx.buckets(50).expect("ignored range").is_empty());
        assert_eq!(idx.total_bucket_count(50).expect("ignored range"), 0);
        assert!(idx.bucket_types(50).expect("ignored range").is_empty());
        assert_eq!(idx.buckets(100).expect("buckets").len(), 2);
    }

    #[test]
    fn queries_reflect_indexed_events() {
        let idx = indexer(1);
        idx.put_block(&staking_block(1)).expect("block 1");
        idx.put_block(&block(2, vec![with_id(CONTRACT, TOPICS.unstaked, 2, &[])]))
            .expect("block 2");

        assert_eq!(idx.total_bucket_count(2).expect("count"), 2);
        assert_eq!(idx.buckets_by_owner(&OWNER, 2).expect("owner").len(), 2);
        assert_eq!(
            idx.buckets_by_indices(&[2, 7], 2).expect("indices").len(),
            1
        );
        assert_eq!(idx.bucket(1, 2).expect("bucket").map(|b| b.index), Some(1));
        assert!(idx.bucket(7, 2).expect("bucket").is_none());
        assert_eq!(idx.bucket_types(2).expect("types").len(), 1);
        // bucket 2 is unstaked and carries no votes
        assert_eq!(idx.candidate_votes(&DELEGATE, 2).expect("votes"), 200);
        assert!(matches!(
            idx.buckets(3),
            Err(IndexerError::NotIndexed { height: 3, indexed: 2 })
        ));
    }

    #[test]
    fn logs_of_other_contracts_are_ignored() {
        let idx = indexer(1);
        let mut logs = vec![bucket_type_activated(Address([1u8; 20]), 100, 10)];
        logs.extend(stake(Address([1u8; 20]), 1, OWNER, DELEGATE, 100, 10));
        idx.put_block(&block(1, logs)).expect("block 1");

        assert!(idx.buckets(1).expect("buckets").is_empty());
    }

    #[test]
    fn view_survives_later_blocks_and_restart_restores_state() {
        let store = Arc::new(MemKvStore::new());
        let idx = StakingIndexer::new(Arc::clone(&store), config(1)).expect("construct");

        // lazily starts the indexer
        let empty = idx.start_view().expect("view");
        assert!(idx.is_ready());
        assert!(empty.buckets().is_empty());

        idx.put_block(&staking_block(1)).expect("block 1");
        let view = idx.start_view().expect("view");
        idx.put_block(&block(2, vec![with_id(CONTRACT, TOPICS.withdrawal, 1, &[])]))
            .expect("block 2");

        assert_eq!(view.height(), 1);
        assert_eq!(view.buckets().len(), 2);
        assert_eq!(view.candidate_votes(&DELEGATE), 400);
        assert_eq!(idx.buckets(2).expect("buckets").len(), 1);

        idx.stop().expect("stop");
        let restarted = StakingIndexer::new(store, config(1)).expect("construct");
        restarted.start().expect("start");
        assert_eq!(restarted.height(), 2);
        let buckets = restarted.buckets(2).expect("buckets");
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].index, 2);
        assert_eq!(restarted.bucket_types(2).expect("types").len(), 1);
        assert_eq!(restarted.total_bucket_count(2).expect("count"), 2);
        let view = restarted.start_view().expect("view");
        assert_eq!(view.buckets_by_candidate(&DELEGATE).len(), 1);
    }
}
