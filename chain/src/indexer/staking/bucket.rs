//! Staking bucket records.

use serde::{Deserialize, Serialize};

use crate::types::Address;

/// Height marker for "never" (not unlocked, not unstaked, deactivated).
pub const MAX_HEIGHT: u64 = u64::MAX;

/// An (amount, duration) pair a bucket can be staked with.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BucketType {
    pub amount: u128,
    /// Lock duration in blocks.
    pub duration: u64,
    /// Height the type was (re)activated at; [`MAX_HEIGHT`] if inactive.
    pub activated_at: u64,
}

impl BucketType {
    pub fn is_active(&self) -> bool {
        self.activated_at != MAX_HEIGHT
    }
}

/// Persisted per-bucket state; amount and duration live in its type.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub type_index: u64,
    pub created_at: u64,
    pub unlocked_at: u64,
    pub unstaked_at: u64,
    pub delegate: Address,
    pub owner: Address,
}

/// Staking position as exposed to readers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Bucket {
    pub index: u64,
    pub candidate: Address,
    pub owner: Address,
    pub staked_amount: u128,
    /// Lock duration in blocks.
    pub staked_duration: u64,
    pub create_block_height: u64,
    /// Height the lock countdown started; the unlock height once unlocked.
    pub staked_block_height: u64,
    /// [`MAX_HEIGHT`] while staked.
    pub unstake_block_height: u64,
    /// Locked buckets auto-stake; unlocking starts the countdown.
    pub auto_stake: bool,
    pub contract_address: Address,
}

impl Bucket {
    pub(crate) fn assemble(
        index: u64,
        info: &BucketInfo,
        bucket_type: &BucketType,
        contract_address: Address,
    ) -> Self {
        let staked_block_height = if info.unlocked_at != MAX_HEIGHT {
            info.unlocked_at
        } else {
            info.created_at
        };
        Self {
            index,
            candidate: info.delegate,
            owner: info.owner,
            staked_amount: bucket_type.amount,
            staked_duration: bucket_type.duration,
            create_block_height: info.created_at,
            staked_block_height,
            unstake_block_height: info.unstaked_at,
            auto_stake: info.unlocked_at == MAX_HEIGHT,
            contract_address,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        !self.auto_stake
    }

    pub fn is_unstaked(&self) -> bool {
        self.unstake_block_height != MAX_HEIGHT
    }
}
