//! Block lifecycle engine and related abstractions.
//!
//! This module provides a modular, testable chain core consisting of:
//!
//! - configuration parameters ([`config::BlockchainConfig`]),
//! - error types with a coarse classification ([`error::ChainError`]),
//! - the persistence seam ([`store::BlockArchive`]),
//! - pluggable validation ([`validator::BlockValidator`]),
//! - block construction ([`minter::BlockMinter`], [`minter::TxPool`]),
//! - post-commit notification ([`subscriber::BlockSubscriber`]),
//! - and the [`engine::Blockchain`] that ties them together.

pub mod config;
pub mod engine;
pub mod error;
pub mod minter;
pub mod store;
pub mod subscriber;
pub mod validator;

pub use config::{BlockchainConfig, ConfigError};
pub use engine::{
    Blockchain, ChainOptions, ChainState, MintOptions, ValidationOptions, productivity,
};
pub use error::{ChainError, ErrorKind, MintError, SubscriberError, ValidationError};
pub use minter::{BlockMinter, PoolMinter, TxPool, VecTxPool};
pub use store::{ArchiveError, BlockArchive};
pub use subscriber::BlockSubscriber;
pub use validator::{AcceptAllValidator, BlockValidator, CombinedValidator};
