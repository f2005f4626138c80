//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::genesis::Genesis;
use crate::protocol::{BlockchainCtx, ExecutionContext, TipInfo, calc_base_fee, calc_excess_blob_gas};
use crate::types::{Action, Address, Block, BlockBuilder, PrivateKey, Receipt, ReceiptStatus};

/// Producer key matching `hex::encode([7u8; 32])`.
pub(crate) fn producer_key() -> PrivateKey {
    PrivateKey::from_bytes(&[7u8; 32]).expect("valid ed25519 secret")
}

pub(crate) fn test_genesis() -> Genesis {
    Genesis {
        timestamp: 1_700_000_000,
        ..Genesis::default()
    }
}

pub(crate) fn test_action(nonce: u64) -> Action {
    Action {
        sender: Address([1u8; 20]),
        nonce,
        gas_limit: 21_000,
        gas_price: 1_000_000_000,
        payload: Vec::new(),
    }
}

/// Context at the genesis tip, without a block attached.
pub(crate) fn test_ctx(genesis: &Genesis) -> ExecutionContext {
    ExecutionContext::new(
        BlockchainCtx {
            chain_id: 1,
            evm_network_id: 4689,
            tip: TipInfo::genesis(genesis),
        },
        Arc::new(genesis.clone()),
    )
}

/// Valid, linked blocks `1..=n` on top of `genesis`, one action each,
/// signed by [`producer_key`].
pub(crate) fn build_chain(genesis: &Genesis, n: u64) -> Vec<Block> {
    let key = producer_key();
    let mut tip = TipInfo::genesis(genesis);
    let mut blocks = Vec::new();

    for height in 1..=n {
        let base_fee = genesis
            .is_dynamic_fee_active(height)
            .then(|| calc_base_fee(genesis, &tip));
        let excess_blob_gas = if genesis.is_blob_active(height) {
            calc_excess_blob_gas(
                tip.excess_blob_gas,
                tip.blob_gas_used,
                genesis.blockchain.blob.target_blob_gas_per_block,
            )
        } else {
            0
        };
        let action = test_action(height);
        let receipt = Receipt {
            status: ReceiptStatus::Success,
            block_height: height,
            action_hash: action.hash(),
            gas_used: action.gas_limit,
            blob_gas_used: 0,
            logs: Vec::new(),
        };

        let block = BlockBuilder::new(height, tip.hash, tip.timestamp + 5)
            .actions(vec![action])
            .receipts(vec![receipt])
            .base_fee(base_fee)
            .excess_blob_gas(excess_blob_gas)
            .sign_and_build(&key);
        tip = TipInfo::from_header(&block.header);
        blocks.push(block);
    }
    blocks
}
