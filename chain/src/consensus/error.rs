//! Errors raised by the chain engine and its collaborators.

use thiserror::Error;

use super::config::ConfigError;
use super::store::ArchiveError;
use crate::protocol::FeeError;
use crate::types::{Hash256, RootError};

/// Error type returned when a block fails a validity predicate.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Block is invalid according to a validity predicate.
    #[error("invalid block: {0}")]
    Invalid(&'static str),
    /// Block is invalid with a dynamic error message.
    #[error("invalid block: {0}")]
    Custom(String),
}

/// Error type returned by a [`super::minter::BlockMinter`].
#[derive(Debug, Error)]
pub enum MintError {
    #[error("transaction pool: {0}")]
    Pool(String),
    #[error("{0}")]
    Other(String),
}

/// Error type returned by a [`super::subscriber::BlockSubscriber`] or by
/// subscriber registration.
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("subscriber is already registered")]
    AlreadyRegistered,
    #[error("subscriber is not registered")]
    NotRegistered,
    #[error("subscriber {name} failed: {reason}")]
    Failed { name: String, reason: String },
}

/// Coarse classification of [`ChainError`]s.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Wrong height or previous hash.
    Ordering,
    /// Bad signature, root or fee adjustment, or a rejecting validator.
    Validity,
    /// Paused chain, missing key, minting or configuration problems.
    Operational,
    /// Underlying store failure.
    Storage,
    /// Persisted state that does not decode or does not line up.
    Consistency,
}

/// High-level errors that can occur in the chain engine.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid tip height: wrong block height {got}, expecting {expected}")]
    InvalidTipHeight { got: u64, expected: u64 },

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("failed to verify EIP1559 header (base fee adjustment): {0}")]
    Fee(#[from] FeeError),

    #[error("failed to verify block's signature with public key {0}")]
    InvalidSignature(String),

    #[error(transparent)]
    Root(#[from] RootError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("blockchain is paused, cannot commit block {height}, {hash}")]
    Paused { height: u64, hash: Hash256 },

    #[error("no producer private key available")]
    NoProducerKey,

    #[error("failed to create block: {0}")]
    Mint(#[from] MintError),

    #[error("archive: {0}")]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Subscriber(#[from] SubscriberError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::InvalidTipHeight { .. } | ChainError::InvalidBlock(_) => ErrorKind::Ordering,
            ChainError::Fee(_)
            | ChainError::InvalidSignature(_)
            | ChainError::Root(_)
            | ChainError::Validation(_) => ErrorKind::Validity,
            ChainError::Paused { .. }
            | ChainError::NoProducerKey
            | ChainError::Mint(_)
            | ChainError::Subscriber(_)
            | ChainError::Config(_) => ErrorKind::Operational,
            ChainError::Archive(ArchiveError::Corrupted(_)) => ErrorKind::Consistency,
            ChainError::Archive(_) => ErrorKind::Storage,
        }
    }
}
