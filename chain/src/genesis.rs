//! Genesis parameters.
//!
//! The genesis provides the synthetic height-0 tip (hash and timestamp) and
//! every height-dependent protocol parameter: block gas limits, fee market
//! constants and the activation heights of protocol upgrades.

use serde::{Deserialize, Serialize};

use crate::types::{Hash256, canonical_encode};

/// Gas limit change taking effect at `height`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GasLimitUpgrade {
    pub height: u64,
    pub gas_limit: u64,
}

/// EIP-1559 fee market parameters.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeParams {
    /// Base fee of the first block after dynamic fees activate.
    pub initial_base_fee: u128,
    /// Floor the base fee never drops below.
    pub min_base_fee: u128,
    /// Bounds the per-block base fee change to `1 / denominator`.
    pub base_fee_change_denominator: u128,
    /// Gas target = gas limit / elasticity multiplier.
    pub elasticity_multiplier: u64,
}

impl Default for FeeParams {
    fn default() -> Self {
        Self {
            initial_base_fee: 1_000_000_000,
            min_base_fee: 1_000_000_000,
            base_fee_change_denominator: 8,
            elasticity_multiplier: 2,
        }
    }
}

/// EIP-4844 blob gas parameters.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobParams {
    pub blob_gas_per_blob: u64,
    pub target_blob_gas_per_block: u64,
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            blob_gas_per_blob: 131_072,
            target_blob_gas_per_block: 393_216,
        }
    }
}

/// Activation heights of protocol upgrades.
///
/// A feature is active for every block whose height is greater than or
/// equal to its activation height.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardforkHeights {
    /// Blocks carry an EIP-1559 base fee from this height on.
    pub dynamic_fee: u64,
    /// Blob-carrying actions and excess blob gas tracking.
    pub blob: u64,
    /// Validation checks the receipt root, not only the tx root.
    pub receipt_root_check: u64,
}

impl Default for HardforkHeights {
    fn default() -> Self {
        Self {
            dynamic_fee: 1,
            blob: 1,
            receipt_root_check: 1,
        }
    }
}

/// Chain-wide protocol parameters.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockchainParams {
    /// Gas limit in force before any upgrade.
    pub block_gas_limit: u64,
    /// Later gas limit changes, in ascending height order.
    pub gas_limit_upgrades: Vec<GasLimitUpgrade>,
    pub fee: FeeParams,
    pub blob: BlobParams,
    pub hardforks: HardforkHeights,
}

impl Default for BlockchainParams {
    fn default() -> Self {
        Self {
            block_gas_limit: 30_000_000,
            gas_limit_upgrades: Vec::new(),
            fee: FeeParams::default(),
            blob: BlobParams::default(),
            hardforks: HardforkHeights::default(),
        }
    }
}

/// Genesis configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Genesis {
    /// Timestamp of the synthetic genesis block, seconds since Unix epoch.
    pub timestamp: u64,
    pub blockchain: BlockchainParams,
}

impl Genesis {
    /// Hash of the synthetic genesis block; blocks at height 1 link to it.
    pub fn hash(&self) -> Hash256 {
        Hash256::compute(&canonical_encode(self))
    }

    /// Gas limit for a block at `height`.
    pub fn block_gas_limit_by_height(&self, height: u64) -> u64 {
        self.blockchain
            .gas_limit_upgrades
            .iter()
            .filter(|u| u.height <= height)
            .max_by_key(|u| u.height)
            .map_or(self.blockchain.block_gas_limit, |u| u.gas_limit)
    }

    pub fn is_dynamic_fee_active(&self, height: u64) -> bool {
        height >= self.blockchain.hardforks.dynamic_fee
    }

    pub fn is_blob_active(&self, height: u64) -> bool {
        height >= self.blockchain.hardforks.blob
    }

    pub fn is_receipt_root_check_active(&self, height: u64) -> bool {
        height >= self.blockchain.hardforks.receipt_root_check
    }
}
