//! Per-call execution context.
//!
//! An [`ExecutionContext`] bundles chain identifiers, genesis parameters,
//! the tip in effect and (once a block is being processed) the block's own
//! parameters. It is derived fresh for every validate / mint / commit call
//! and never mutated afterwards; [`ExecutionContext::with_block`] returns a
//! new value. Height-dependent protocol rules are read off it through
//! [`FeatureCtx`], which is how upgrades apply deterministically per height.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::genesis::Genesis;
use crate::types::{Address, Hash256, Header};

/// Summary of the last durably committed block.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TipInfo {
    pub height: u64,
    pub hash: Hash256,
    pub timestamp: u64,
    pub gas_used: u64,
    pub base_fee: Option<u128>,
    pub excess_blob_gas: u64,
    pub blob_gas_used: u64,
}

impl TipInfo {
    /// Synthetic height-0 tip derived from the genesis configuration.
    pub fn genesis(genesis: &Genesis) -> Self {
        Self {
            height: 0,
            hash: genesis.hash(),
            timestamp: genesis.timestamp,
            gas_used: 0,
            base_fee: None,
            excess_blob_gas: 0,
            blob_gas_used: 0,
        }
    }

    /// Tip summary of a committed header.
    pub fn from_header(header: &Header) -> Self {
        Self {
            height: header.height,
            hash: header.hash(),
            timestamp: header.timestamp,
            gas_used: header.gas_used,
            base_fee: header.base_fee,
            excess_blob_gas: header.excess_blob_gas,
            blob_gas_used: header.blob_gas_used,
        }
    }
}

/// Chain identity plus the tip the context was derived from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockchainCtx {
    pub chain_id: u32,
    pub evm_network_id: u32,
    pub tip: TipInfo,
}

/// Parameters of the block being validated, minted or committed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockCtx {
    pub height: u64,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub producer: Address,
    pub base_fee: Option<u128>,
    pub excess_blob_gas: u64,
    pub skip_sidecar_validation: bool,
}

/// Protocol features active at a given height.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FeatureCtx {
    pub height: u64,
    pub dynamic_fee: bool,
    pub blob: bool,
    pub receipt_root_check: bool,
}

impl FeatureCtx {
    pub fn at_height(genesis: &Genesis, height: u64) -> Self {
        Self {
            height,
            dynamic_fee: genesis.is_dynamic_fee_active(height),
            blob: genesis.is_blob_active(height),
            receipt_root_check: genesis.is_receipt_root_check_active(height),
        }
    }
}

/// Immutable bundle of everything height-dependent rules need.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    blockchain: BlockchainCtx,
    genesis: Arc<Genesis>,
    block: Option<BlockCtx>,
}

impl ExecutionContext {
    pub fn new(blockchain: BlockchainCtx, genesis: Arc<Genesis>) -> Self {
        Self {
            blockchain,
            genesis,
            block: None,
        }
    }

    /// Returns a copy of this context scoped to `block`.
    pub fn with_block(&self, block: BlockCtx) -> Self {
        Self {
            blockchain: self.blockchain.clone(),
            genesis: self.genesis.clone(),
            block: Some(block),
        }
    }

    pub fn blockchain(&self) -> &BlockchainCtx {
        &self.blockchain
    }

    pub fn tip(&self) -> &TipInfo {
        &self.blockchain.tip
    }

    pub fn genesis(&self) -> &Genesis {
        &self.genesis
    }

    pub fn block(&self) -> Option<&BlockCtx> {
        self.block.as_ref()
    }

    /// Height whose rules apply: the block in scope, or the block after
    /// the tip when no block is attached.
    pub fn height(&self) -> u64 {
        self.block
            .as_ref()
            .map_or(self.blockchain.tip.height + 1, |b| b.height)
    }

    /// Features in force for [`ExecutionContext::height`].
    pub fn features(&self) -> FeatureCtx {
        FeatureCtx::at_height(&self.genesis, self.height())
    }

    /// Features in force at an arbitrary height.
    pub fn features_at(&self, height: u64) -> FeatureCtx {
        FeatureCtx::at_height(&self.genesis, height)
    }
}
