//! Base validity predicate for blocks.
//!
//! This validator enforces cheap, deterministic invariants that do not
//! require executing actions, such as:
//!
//! - action count limits,
//! - the summed action gas limits fitting the block gas limit,
//! - one receipt per action, in action order,
//! - absence of duplicate actions within a single block.

use std::collections::HashSet;

use crate::consensus::config::BlockchainConfig;
use crate::consensus::error::ValidationError;
use crate::consensus::validator::BlockValidator;
use crate::protocol::ExecutionContext;
use crate::types::Block;

/// Base validity predicate for blocks.
///
/// This struct is configured using [`BlockchainConfig`] and performs
/// purely block-local checks that are inexpensive to run.
#[derive(Clone, Debug)]
pub struct BaseValidity {
    max_block_actions: usize,
}

impl BaseValidity {
    /// Constructs a new `BaseValidity` from the chain configuration.
    pub fn new(cfg: &BlockchainConfig) -> Self {
        Self {
            max_block_actions: cfg.max_block_actions,
        }
    }

    fn check_action_count(&self, block: &Block) -> Result<(), ValidationError> {
        let count = block.actions.len();
        if count > self.max_block_actions {
            return Err(ValidationError::Custom(format!(
                "block has {} actions, exceeds max_block_actions={}",
                count, self.max_block_actions
            )));
        }
        Ok(())
    }

    fn check_gas(&self, ctx: &ExecutionContext, block: &Block) -> Result<(), ValidationError> {
        let gas_limit = match ctx.block() {
            Some(bctx) => bctx.gas_limit,
            None => ctx.genesis().block_gas_limit_by_height(block.height()),
        };
        let total = block
            .actions
            .iter()
            .try_fold(0u64, |acc, a| acc.checked_add(a.gas_limit))
            .ok_or(ValidationError::Invalid("action gas limits overflow"))?;
        if total > gas_limit {
            return Err(ValidationError::Custom(format!(
                "actions request {total} gas, exceeds block gas limit {gas_limit}"
            )));
        }
        Ok(())
    }

    fn check_receipts(&self, block: &Block) -> Result<(), ValidationError> {
        if block.receipts.len() != block.actions.len() {
            return Err(ValidationError::Custom(format!(
                "block has {} receipts for {} actions",
                block.receipts.len(),
                block.actions.len()
            )));
        }
        for (action, receipt) in block.actions.iter().zip(&block.receipts) {
            if receipt.action_hash != action.hash() {
                return Err(ValidationError::Invalid("receipt out of action order"));
            }
        }
        Ok(())
    }

    fn check_duplicate_actions(&self, block: &Block) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for action in &block.actions {
            if !seen.insert(action.hash()) {
                return Err(ValidationError::Custom(format!(
                    "duplicate action {} within the same block",
                    action.hash()
                )));
            }
        }
        Ok(())
    }
}

impl BlockValidator for BaseValidity {
    fn validate(&self, ctx: &ExecutionContext, block: &Block) -> Result<(), ValidationError> {
        self.check_action_count(block)?;
        self.check_gas(ctx, block)?;
        self.check_receipts(block)?;
        self.check_duplicate_actions(block)?;
        Ok(())
    }
}
