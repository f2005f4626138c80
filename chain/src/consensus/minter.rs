//! Block minting.
//!
//! The minter is responsible for assembling and signing a candidate block
//! for the height described by the [`ExecutionContext`], given a signing
//! key chosen by the engine.

use parking_lot::Mutex;

use crate::protocol::ExecutionContext;
use crate::types::{Action, Block, BlockBuilder, PrivateKey, Receipt, ReceiptStatus};

use super::error::MintError;

/// Produces a signed block for the height in `ctx`.
pub trait BlockMinter: Send + Sync {
    fn mint(&self, ctx: &ExecutionContext, key: &PrivateKey) -> Result<Block, MintError>;
}

/// Abstract transaction pool interface.
///
/// The chain does not care how actions are stored or gossiped; it only
/// needs a way to ask for a batch of actions that fit into a block.
pub trait TxPool: Send {
    /// Selects a batch of actions for inclusion in a block.
    ///
    /// Implementations should treat `max_actions` and `gas_limit` as hard
    /// upper bounds on the count and on the summed action gas limits.
    fn select_for_block(&mut self, max_actions: usize, gas_limit: u64) -> Vec<Action>;
}

/// [`BlockMinter`] that drains a [`TxPool`].
///
/// Execution belongs to the VM collaborator; this minter records one
/// successful receipt per action charging its full gas limit, which is
/// enough for devnets and tests.
///
/// Selected actions are removed from the pool when the block is minted, not
/// when it is committed. A minted block that is never committed loses its
/// actions unless the caller resubmits them.
pub struct PoolMinter<P> {
    pool: Mutex<P>,
    max_block_actions: usize,
}

impl<P: TxPool> PoolMinter<P> {
    pub fn new(pool: P, max_block_actions: usize) -> Self {
        Self {
            pool: Mutex::new(pool),
            max_block_actions,
        }
    }
}

impl<P: TxPool> BlockMinter for PoolMinter<P> {
    fn mint(&self, ctx: &ExecutionContext, key: &PrivateKey) -> Result<Block, MintError> {
        let bctx = ctx
            .block()
            .ok_or_else(|| MintError::Other("missing block context".to_string()))?;

        let actions = self
            .pool
            .lock()
            .select_for_block(self.max_block_actions, bctx.gas_limit);
        let receipts = actions
            .iter()
            .map(|a| Receipt {
                status: ReceiptStatus::Success,
                block_height: bctx.height,
                action_hash: a.hash(),
                gas_used: a.gas_limit,
                blob_gas_used: 0,
                logs: Vec::new(),
            })
            .collect();

        let features = ctx.features();
        let base_fee = if features.dynamic_fee {
            bctx.base_fee
        } else {
            None
        };
        let excess_blob_gas = if features.blob {
            bctx.excess_blob_gas
        } else {
            0
        };

        Ok(BlockBuilder::new(bctx.height, ctx.tip().hash, bctx.timestamp)
            .actions(actions)
            .receipts(receipts)
            .base_fee(base_fee)
            .excess_blob_gas(excess_blob_gas)
            .sign_and_build(key))
    }
}

/// Simple FIFO pool, handy for devnets and tests.
#[derive(Debug, Default)]
pub struct VecTxPool {
    actions: Vec<Action>,
}

impl VecTxPool {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl TxPool for VecTxPool {
    fn select_for_block(&mut self, max_actions: usize, gas_limit: u64) -> Vec<Action> {
        let mut gas = 0u64;
        let mut take = 0;
        for a in self.actions.iter().take(max_actions) {
            match gas.checked_add(a.gas_limit) {
                Some(total) if total <= gas_limit => gas = total,
                _ => break,
            }
            take += 1;
        }
        self.actions.drain(..take).collect()
    }
}
