//! Staking contract events and the per-block handler that applies them.
//!
//! Events are matched on `topics[0]`, the Keccak-256 hash of the event
//! signature. Indexed arguments come from the remaining topics, the others
//! from `data` as consecutive 32-byte ABI words.

use std::collections::HashMap;
use std::sync::LazyLock;

use sha3::{Digest, Keccak256};

use super::bucket::{BucketInfo, BucketType, MAX_HEIGHT};
use super::cache::{
    NS_BUCKET_INFO, NS_BUCKET_TYPE, NS_META, StakingCache, StakingDelta, TOTAL_COUNT_KEY,
};
use crate::indexer::{EventHandler, IndexerError};
use crate::storage::Batch;
use crate::types::{ADDRESS_LEN, Address, HASH_LEN, Hash256, Log, canonical_encode};

const WORD: usize = HASH_LEN;

/// Keccak-256 topic of an event signature such as `"Unlocked(uint256)"`.
pub fn event_topic(signature: &str) -> Hash256 {
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    Hash256(hasher.finalize().into())
}

pub(crate) struct EventTopics {
    pub bucket_type_activated: Hash256,
    pub bucket_type_deactivated: Hash256,
    pub staked: Hash256,
    pub locked: Hash256,
    pub unlocked: Hash256,
    pub unstaked: Hash256,
    pub duration_extended: Hash256,
    pub amount_increased: Hash256,
    pub delegate_changed: Hash256,
    pub withdrawal: Hash256,
    pub transfer: Hash256,
}

pub(crate) static TOPICS: LazyLock<EventTopics> = LazyLock::new(|| EventTopics {
    bucket_type_activated: event_topic("BucketTypeActivated(uint256,uint256)"),
    bucket_type_deactivated: event_topic("BucketTypeDeactivated(uint256,uint256)"),
    staked: event_topic("Staked(uint256,address,uint256,uint256)"),
    locked: event_topic("Locked(uint256,uint256)"),
    unlocked: event_topic("Unlocked(uint256)"),
    unstaked: event_topic("Unstaked(uint256)"),
    duration_extended: event_topic("DurationExtended(uint256,uint256)"),
    amount_increased: event_topic("AmountIncreased(uint256,uint256)"),
    delegate_changed: event_topic("DelegateChanged(uint256,address)"),
    withdrawal: event_topic("Withdrawal(uint256,address)"),
    transfer: event_topic("Transfer(address,address,uint256)"),
});

fn topic(log: &Log, i: usize) -> Result<&[u8; HASH_LEN], IndexerError> {
    log.topics
        .get(i)
        .map(|t| t.as_bytes())
        .ok_or_else(|| IndexerError::Event(format!("missing topic {i}")))
}

fn data_word(log: &Log, i: usize) -> Result<&[u8], IndexerError> {
    log.data
        .get(i * WORD..(i + 1) * WORD)
        .ok_or_else(|| IndexerError::Event(format!("missing data word {i}")))
}

fn word_u128(word: &[u8]) -> Result<u128, IndexerError> {
    let (high, low) = word.split_at(WORD - 16);
    if high.iter().any(|b| *b != 0) {
        return Err(IndexerError::Event("uint256 does not fit in 128 bits".into()));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(low);
    Ok(u128::from_be_bytes(buf))
}

fn word_u64(word: &[u8]) -> Result<u64, IndexerError> {
    u64::try_from(word_u128(word)?)
        .map_err(|_| IndexerError::Event("uint256 does not fit in 64 bits".into()))
}

fn word_address(word: &[u8]) -> Address {
    let mut out = [0u8; ADDRESS_LEN];
    out.copy_from_slice(&word[WORD - ADDRESS_LEN..]);
    Address(out)
}

/// Applies staking events of one block on top of a [`StakingCache`].
///
/// Reads go through the pending delta first, so later events in the same
/// block see the effects of earlier ones.
pub struct StakingEventHandler {
    delta: StakingDelta,
    token_owner: HashMap<u64, Address>,
    next_type_id: u64,
}

impl StakingEventHandler {
    pub(crate) fn new(cache: &StakingCache) -> Self {
        Self {
            delta: StakingDelta {
                total_bucket_count: cache.total_bucket_count(),
                ..StakingDelta::default()
            },
            token_owner: HashMap::new(),
            next_type_id: cache.next_type_id(),
        }
    }

    fn bucket_info(&self, cache: &StakingCache, id: u64) -> Result<BucketInfo, IndexerError> {
        let found = match self.delta.buckets.get(&id) {
            Some(pending) => pending.clone(),
            None => cache.bucket_info(id).cloned(),
        };
        found.ok_or_else(|| IndexerError::Event(format!("bucket {id} not found")))
    }

    fn bucket_type(&self, cache: &StakingCache, id: u64) -> Result<BucketType, IndexerError> {
        self.delta
            .bucket_types
            .get(&id)
            .or_else(|| cache.bucket_type(id))
            .cloned()
            .ok_or_else(|| IndexerError::Event(format!("bucket type {id} not found")))
    }

    fn type_id(&self, cache: &StakingCache, amount: u128, duration: u64) -> Option<u64> {
        self.delta
            .bucket_types
            .iter()
            .find(|(_, bt)| bt.amount == amount && bt.duration == duration)
            .map(|(id, _)| *id)
            .or_else(|| cache.type_id(amount, duration))
    }

    fn require_type_id(
        &self,
        cache: &StakingCache,
        amount: u128,
        duration: u64,
    ) -> Result<u64, IndexerError> {
        self.type_id(cache, amount, duration).ok_or_else(|| {
            IndexerError::Event(format!(
                "no bucket type with amount {amount} and duration {duration}"
            ))
        })
    }

    fn put_bucket(&mut self, id: u64, info: BucketInfo) {
        self.delta.buckets.insert(id, Some(info));
    }

    fn handle_bucket_type_activated(
        &mut self,
        cache: &StakingCache,
        height: u64,
        log: &Log,
    ) -> Result<(), IndexerError> {
        let amount = word_u128(data_word(log, 0)?)?;
        let duration = word_u64(data_word(log, 1)?)?;
        let id = match self.type_id(cache, amount, duration) {
            Some(id) => id,
            None => {
                let id = self.next_type_id;
                self.next_type_id += 1;
                id
            }
        };
        self.delta.bucket_types.insert(
            id,
            BucketType {
                amount,
                duration,
                activated_at: height,
            },
        );
        Ok(())
    }

    fn handle_bucket_type_deactivated(
        &mut self,
        cache: &StakingCache,
        log: &Log,
    ) -> Result<(), IndexerError> {
        let amount = word_u128(data_word(log, 0)?)?;
        let duration = word_u64(data_word(log, 1)?)?;
        let id = self.require_type_id(cache, amount, duration)?;
        let mut bt = self.bucket_type(cache, id)?;
        bt.activated_at = MAX_HEIGHT;
        self.delta.bucket_types.insert(id, bt);
        Ok(())
    }

    fn handle_staked(
        &mut self,
        cache: &StakingCache,
        height: u64,
        log: &Log,
    ) -> Result<(), IndexerError> {
        let id = word_u64(topic(log, 1)?)?;
        let delegate = word_address(data_word(log, 0)?);
        let amount = word_u128(data_word(log, 1)?)?;
        let duration = word_u64(data_word(log, 2)?)?;
        let type_index = self.require_type_id(cache, amount, duration)?;
        let owner = *self
            .token_owner
            .get(&id)
            .ok_or_else(|| IndexerError::Event(format!("no owner for token {id}")))?;

        self.put_bucket(
            id,
            BucketInfo {
                type_index,
                created_at: height,
                unlocked_at: MAX_HEIGHT,
                unstaked_at: MAX_HEIGHT,
                delegate,
                owner,
            },
        );
        self.delta.total_bucket_count += 1;
        Ok(())
    }

    fn handle_locked(&mut self, cache: &StakingCache, log: &Log) -> Result<(), IndexerError> {
        let id = word_u64(topic(log, 1)?)?;
        let duration = word_u64(data_word(log, 0)?)?;
        let mut info = self.bucket_info(cache, id)?;
        let amount = self.bucket_type(cache, info.type_index)?.amount;
        info.type_index = self.require_type_id(cache, amount, duration)?;
        info.unlocked_at = MAX_HEIGHT;
        self.put_bucket(id, info);
        Ok(())
    }

    fn handle_unlocked(
        &mut self,
        cache: &StakingCache,
        height: u64,
        log: &Log,
    ) -> Result<(), IndexerError> {
        let id = word_u64(topic(log, 1)?)?;
        let mut info = self.bucket_info(cache, id)?;
        info.unlocked_at = height;
        self.put_bucket(id, info);
        Ok(())
    }

    fn handle_unstaked(
        &mut self,
        cache: &StakingCache,
        height: u64,
        log: &Log,
    ) -> Result<(), IndexerError> {
        let id = word_u64(topic(log, 1)?)?;
        let mut info = self.bucket_info(cache, id)?;
        info.unstaked_at = height;
        self.put_bucket(id, info);
        Ok(())
    }

    fn handle_duration_extended(
        &mut self,
        cache: &StakingCache,
        log: &Log,
    ) -> Result<(), IndexerError> {
        let id = word_u64(topic(log, 1)?)?;
        let duration = word_u64(data_word(log, 0)?)?;
        let mut info = self.bucket_info(cache, id)?;
        let amount = self.bucket_type(cache, info.type_index)?.amount;
        info.type_index = self.require_type_id(cache, amount, duration)?;
        self.put_bucket(id, info);
        Ok(())
    }

    fn handle_amount_increased(
        &mut self,
        cache: &StakingCache,
        log: &Log,
    ) -> Result<(), IndexerError> {
        let id = word_u64(topic(log, 1)?)?;
        let amount = word_u128(data_word(log, 0)?)?;
        let mut info = self.bucket_info(cache, id)?;
        let duration = self.bucket_type(cache, info.type_index)?.duration;
        info.type_index = self.require_type_id(cache, amount, duration)?;
        self.put_bucket(id, info);
        Ok(())
    }

    fn handle_delegate_changed(
        &mut self,
        cache: &StakingCache,
        log: &Log,
    ) -> Result<(), IndexerError> {
        let id = word_u64(topic(log, 1)?)?;
        let mut info = self.bucket_info(cache, id)?;
        info.delegate = word_address(data_word(log, 0)?);
        self.put_bucket(id, info);
        Ok(())
    }

    fn handle_withdrawal(&mut self, cache: &StakingCache, log: &Log) -> Result<(), IndexerError> {
        let id = word_u64(topic(log, 1)?)?;
        self.bucket_info(cache, id)?;
        self.delta.buckets.insert(id, None);
        Ok(())
    }

    fn handle_transfer(&mut self, cache: &StakingCache, log: &Log) -> Result<(), IndexerError> {
        let to = word_address(topic(log, 2)?);
        let id = word_u64(topic(log, 3)?)?;
        self.token_owner.insert(id, to);
        // mints precede `Staked`, so the bucket may not exist yet
        if let Ok(mut info) = self.bucket_info(cache, id) {
            info.owner = to;
            self.put_bucket(id, info);
        }
        Ok(())
    }
}

impl EventHandler<StakingCache> for StakingEventHandler {
    type Delta = StakingDelta;

    fn handle_event(
        &mut self,
        cache: &StakingCache,
        height: u64,
        log: &Log,
    ) -> Result<(), IndexerError> {
        let Some(sig) = log.topics.first() else {
            return Ok(());
        };
        let t = &*TOPICS;
        match *sig {
            s if s == t.bucket_type_activated => {
                self.handle_bucket_type_activated(cache, height, log)
            }
            s if s == t.bucket_type_deactivated => self.handle_bucket_type_deactivated(cache, log),
            s if s == t.staked => self.handle_staked(cache, height, log),
            s if s == t.locked => self.handle_locked(cache, log),
            s if s == t.unlocked => self.handle_unlocked(cache, height, log),
            s if s == t.unstaked => self.handle_unstaked(cache, height, log),
            s if s == t.duration_extended => self.handle_duration_extended(cache, log),
            s if s == t.amount_increased => self.handle_amount_increased(cache, log),
            s if s == t.delegate_changed => self.handle_delegate_changed(cache, log),
            s if s == t.withdrawal => self.handle_withdrawal(cache, log),
            s if s == t.transfer => self.handle_transfer(cache, log),
            // other contract events carry no index state
            _ => Ok(()),
        }
    }

    fn result(self) -> (Batch, StakingDelta) {
        let mut batch = Batch::new();
        for (id, bt) in &self.delta.bucket_types {
            batch.put(NS_BUCKET_TYPE, &id.to_be_bytes(), &canonical_encode(bt));
        }
        for (id, info) in &self.delta.buckets {
            match info {
                Some(info) => batch.put(NS_BUCKET_INFO, &id.to_be_bytes(), &canonical_encode(info)),
                None => batch.delete(NS_BUCKET_INFO, &id.to_be_bytes()),
            }
        }
        batch.put(
            NS_META,
            TOTAL_COUNT_KEY,
            &self.delta.total_bucket_count.to_be_bytes(),
        );
        (batch, self.delta)
    }
}
