// chain/src/types/block.rs

//! Block types and hashing.
//!
//! This module defines the block data structures committed by the chain,
//! together with the canonical hashing routines used for linkage,
//! signatures and the transaction / receipt roots.
//!
//! Serialization is done with **bincode 2** using the `serde` integration
//! and an explicit `standard()` config. The same canonical encoding is used
//! everywhere we need block bytes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Address, Hash256, PrivateKey, PublicKey, Signature, canonical_encode};

/// Mismatch between a root carried in the header and the recomputed one.
#[derive(Debug, Error)]
pub enum RootError {
    #[error("tx root mismatch: header {expected}, computed {actual}")]
    TxRoot { expected: Hash256, actual: Hash256 },

    #[error("receipt root mismatch: header {expected}, computed {actual}")]
    ReceiptRoot { expected: Hash256, actual: Hash256 },
}

/// A signed action included in a block.
///
/// Execution semantics are owned by the VM collaborator; the chain core
/// only needs a stable hash per action for the tx root and for linking
/// receipts back to the action that produced them.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Account that signed the action.
    pub sender: Address,
    /// Anti-replay nonce relative to the sender.
    pub nonce: u64,
    /// Gas the sender is willing to spend.
    pub gas_limit: u64,
    /// Price per gas unit offered by the sender.
    pub gas_price: u128,
    /// Opaque execution payload (contract call data, transfer, ...).
    pub payload: Vec<u8>,
}

impl Action {
    /// Canonical action hash.
    pub fn hash(&self) -> Hash256 {
        Hash256::compute(&canonical_encode(self))
    }
}

/// Outcome status of an executed action.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Failure,
    Success,
}

/// Event log emitted by a contract while executing an action.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Log {
    /// Contract that emitted the log.
    pub address: Address,
    /// Indexed topics; `topics[0]` is the event signature hash.
    pub topics: Vec<Hash256>,
    /// Non-indexed event arguments, as 32-byte ABI words.
    pub data: Vec<u8>,
    /// Height of the block containing the action.
    pub block_height: u64,
    /// Hash of the action that emitted the log.
    pub action_hash: Hash256,
    /// Position of the log within the receipt.
    pub index: u32,
}

/// Execution receipt of a single action.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub status: ReceiptStatus,
    pub block_height: u64,
    pub action_hash: Hash256,
    pub gas_used: u64,
    pub blob_gas_used: u64,
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Canonical receipt hash.
    pub fn hash(&self) -> Hash256 {
        Hash256::compute(&canonical_encode(self))
    }

    /// Returns `true` if the action executed successfully.
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

/// Block header.
///
/// Everything except `signature` forms the signed "header core"; the block
/// hash covers the core plus the signature so that two signatures over the
/// same core never collide.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Height of this block. Genesis is the synthetic height 0.
    pub height: u64,
    /// Hash of the previous block (or the genesis hash at height 1).
    pub prev_hash: Hash256,
    /// Block timestamp, in seconds since the Unix epoch.
    pub timestamp: u64,
    /// Root over the hashes of all actions in the block.
    pub tx_root: Hash256,
    /// Root over the hashes of all receipts in the block.
    pub receipt_root: Hash256,
    /// Total gas used by the block's actions.
    pub gas_used: u64,
    /// Total blob gas used by the block's actions.
    pub blob_gas_used: u64,
    /// EIP-1559 base fee; `None` before dynamic fees activate.
    pub base_fee: Option<u128>,
    /// Running excess blob gas (EIP-4844).
    pub excess_blob_gas: u64,
    /// Public key of the producer that signed this header.
    pub producer: PublicKey,
    /// Producer signature over [`Header::core_hash`].
    pub signature: Signature,
}

#[derive(Serialize)]
struct HeaderCore<'a> {
    height: u64,
    prev_hash: &'a Hash256,
    timestamp: u64,
    tx_root: &'a Hash256,
    receipt_root: &'a Hash256,
    gas_used: u64,
    blob_gas_used: u64,
    base_fee: Option<u128>,
    excess_blob_gas: u64,
    producer: &'a PublicKey,
}

impl Header {
    fn core(&self) -> HeaderCore<'_> {
        HeaderCore {
            height: self.height,
            prev_hash: &self.prev_hash,
            timestamp: self.timestamp,
            tx_root: &self.tx_root,
            receipt_root: &self.receipt_root,
            gas_used: self.gas_used,
            blob_gas_used: self.blob_gas_used,
            base_fee: self.base_fee,
            excess_blob_gas: self.excess_blob_gas,
            producer: &self.producer,
        }
    }

    /// Hash of the header core: the message the producer signs.
    pub fn core_hash(&self) -> Hash256 {
        Hash256::compute(&canonical_encode(&self.core()))
    }

    /// Block hash: covers the header core and the signature.
    pub fn hash(&self) -> Hash256 {
        Hash256::compute(&canonical_encode(self))
    }

    /// Checks the producer signature over the header core.
    pub fn verify_signature(&self) -> bool {
        self.producer
            .verify(self.core_hash().as_bytes(), &self.signature)
    }

    /// Address of the producer that signed this header.
    pub fn producer_address(&self) -> Address {
        self.producer.address()
    }
}

/// Consensus endorsement of a committed block.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Endorsement {
    pub endorser: PublicKey,
    pub timestamp: u64,
    pub signature: Signature,
}

/// Data attached to a block after consensus (not covered by the header).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Footer {
    /// Time the consensus round committed the block.
    pub commit_time: u64,
    pub endorsements: Vec<Endorsement>,
}

/// Block = header + actions + receipts + footer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub actions: Vec<Action>,
    pub receipts: Vec<Receipt>,
    pub footer: Footer,
}

impl Block {
    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn prev_hash(&self) -> Hash256 {
        self.header.prev_hash
    }

    pub fn timestamp(&self) -> u64 {
        self.header.timestamp
    }

    pub fn base_fee(&self) -> Option<u128> {
        self.header.base_fee
    }

    pub fn excess_blob_gas(&self) -> u64 {
        self.header.excess_blob_gas
    }

    pub fn gas_used(&self) -> u64 {
        self.header.gas_used
    }

    pub fn blob_gas_used(&self) -> u64 {
        self.header.blob_gas_used
    }

    /// Block hash, see [`Header::hash`].
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Returns the canonical byte representation of this block.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_encode(self)
    }

    /// Root over the hashes of the block's actions.
    pub fn calculate_tx_root(&self) -> Hash256 {
        hash_list_root(self.actions.iter().map(Action::hash))
    }

    /// Root over the hashes of the block's receipts.
    pub fn calculate_receipt_root(&self) -> Hash256 {
        hash_list_root(self.receipts.iter().map(Receipt::hash))
    }

    /// Recomputes the tx root and compares it with the header.
    pub fn verify_tx_root(&self) -> Result<(), RootError> {
        let tx_root = self.calculate_tx_root();
        if tx_root != self.header.tx_root {
            return Err(RootError::TxRoot {
                expected: self.header.tx_root,
                actual: tx_root,
            });
        }
        Ok(())
    }

    /// Recomputes the receipt root and compares it with the header.
    pub fn verify_receipt_root(&self) -> Result<(), RootError> {
        let receipt_root = self.calculate_receipt_root();
        if receipt_root != self.header.receipt_root {
            return Err(RootError::ReceiptRoot {
                expected: self.header.receipt_root,
                actual: receipt_root,
            });
        }
        Ok(())
    }

    /// Recomputes both roots and compares them with the header.
    pub fn verify_roots(&self) -> Result<(), RootError> {
        self.verify_tx_root()?;
        self.verify_receipt_root()
    }
}

/// BLAKE3 over the concatenated item hashes; the zero hash for an empty list.
fn hash_list_root(hashes: impl Iterator<Item = Hash256>) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    let mut any = false;
    for h in hashes {
        hasher.update(h.as_bytes());
        any = true;
    }
    if !any {
        return Hash256::ZERO;
    }
    Hash256(*hasher.finalize().as_bytes())
}

/// Assembles a block, derives its roots and gas totals, and signs it.
#[derive(Clone, Debug)]
pub struct BlockBuilder {
    height: u64,
    prev_hash: Hash256,
    timestamp: u64,
    actions: Vec<Action>,
    receipts: Vec<Receipt>,
    base_fee: Option<u128>,
    excess_blob_gas: u64,
}

impl BlockBuilder {
    pub fn new(height: u64, prev_hash: Hash256, timestamp: u64) -> Self {
        Self {
            height,
            prev_hash,
            timestamp,
            actions: Vec::new(),
            receipts: Vec::new(),
            base_fee: None,
            excess_blob_gas: 0,
        }
    }

    pub fn actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn receipts(mut self, receipts: Vec<Receipt>) -> Self {
        self.receipts = receipts;
        self
    }

    pub fn base_fee(mut self, base_fee: Option<u128>) -> Self {
        self.base_fee = base_fee;
        self
    }

    pub fn excess_blob_gas(mut self, excess_blob_gas: u64) -> Self {
        self.excess_blob_gas = excess_blob_gas;
        self
    }

    /// Fills in roots and gas totals, then signs the header core with `key`.
    pub fn sign_and_build(self, key: &PrivateKey) -> Block {
        let gas_used = self.receipts.iter().map(|r| r.gas_used).sum();
        let blob_gas_used = self.receipts.iter().map(|r| r.blob_gas_used).sum();

        let mut block = Block {
            header: Header {
                height: self.height,
                prev_hash: self.prev_hash,
                timestamp: self.timestamp,
                tx_root: Hash256::ZERO,
                receipt_root: Hash256::ZERO,
                gas_used,
                blob_gas_used,
                base_fee: self.base_fee,
                excess_blob_gas: self.excess_blob_gas,
                producer: key.public_key(),
                signature: Signature::default(),
            },
            actions: self.actions,
            receipts: self.receipts,
            footer: Footer::default(),
        };
        block.header.tx_root = block.calculate_tx_root();
        block.header.receipt_root = block.calculate_receipt_root();
        block.header.signature = key.sign(block.header.core_hash().as_bytes());
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ADDRESS_LEN;

    fn key() -> PrivateKey {
        PrivateKey::from_bytes(&[3u8; 32]).unwrap()
    }

    fn action(nonce: u64) -> Action {
        Action {
            sender: Address([1u8; ADDRESS_LEN]),
            nonce,
            gas_limit: 21_000,
            gas_price: 1,
            payload: vec![nonce as u8],
        }
    }

    fn receipt(a: &Action, gas_used: u64) -> Receipt {
        Receipt {
            status: ReceiptStatus::Success,
            block_height: 1,
            action_hash: a.hash(),
            gas_used,
            blob_gas_used: 0,
            logs: Vec::new(),
        }
    }

    #[test]
    fn built_block_verifies() {
        let a = action(0);
        let block = BlockBuilder::new(1, Hash256([9u8; 32]), 1_700_000_000)
            .receipts(vec![receipt(&a, 21_000)])
            .actions(vec![a])
            .sign_and_build(&key());

        assert!(block.header.verify_signature());
        assert!(block.verify_roots().is_ok());
        assert_eq!(block.gas_used(), 21_000);
        assert_eq!(block.header.producer_address(), key().public_key().address());
    }

    #[test]
    fn tampering_breaks_signature_and_hash() {
        let block = BlockBuilder::new(1, Hash256::ZERO, 10).sign_and_build(&key());
        let original_hash = block.hash();

        let mut tampered = block.clone();
        tampered.header.timestamp += 1;

        assert!(!tampered.header.verify_signature());
        assert_ne!(tampered.hash(), original_hash);
    }

    #[test]
    fn tampered_actions_fail_root_check() {
        let mut block = BlockBuilder::new(1, Hash256::ZERO, 10)
            .actions(vec![action(0)])
            .sign_and_build(&key());
        block.actions.push(action(1));

        assert!(matches!(block.verify_roots(), Err(RootError::TxRoot { .. })));
    }

    #[test]
    fn empty_block_has_zero_roots() {
        let block = BlockBuilder::new(1, Hash256::ZERO, 10).sign_and_build(&key());
        assert_eq!(block.header.tx_root, Hash256::ZERO);
        assert_eq!(block.header.receipt_root, Hash256::ZERO);
    }

    #[test]
    fn block_hash_is_deterministic() {
        let block = BlockBuilder::new(7, Hash256([2u8; 32]), 99)
            .actions(vec![action(3)])
            .sign_and_build(&key());
        assert_eq!(block.hash(), block.clone().hash());
    }
}
