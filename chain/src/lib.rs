//! Chain library crate.
//!
//! This crate provides the core of a full node: the component that accepts
//! candidate blocks, validates them, commits them durably in strict height
//! order and keeps derived indexes consistent with the committed chain.
//!
//! - strongly-typed domain types (`types`),
//! - genesis parameters and per-height protocol rules (`genesis`, `protocol`),
//! - the block lifecycle engine (`consensus`),
//! - block validity predicates (`validation`),
//! - namespaced key-value storage, the buffered store and the block
//!   archive (`storage`),
//! - block-driven secondary indexes such as contract staking (`indexer`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level node configuration (`config`).
//!
//! Higher-level binaries compose these pieces into nodes; the library does
//! not install a tracing subscriber.

pub mod config;
pub mod consensus;
pub mod genesis;
pub mod indexer;
pub mod metrics;
pub mod protocol;
pub mod storage;
pub mod types;
pub mod validation;

#[cfg(test)]
mod test_utils;

// Re-export top-level configuration types.
pub use config::{ChainConfig, MetricsConfig};

// Re-export "core" chain types and traits.
pub use consensus::{
    AcceptAllValidator, ArchiveError, BlockArchive, BlockMinter, BlockSubscriber, BlockValidator,
    Blockchain, BlockchainConfig, ChainError, ChainOptions, CombinedValidator, ErrorKind,
    MintOptions, PoolMinter, TxPool, ValidationError, ValidationOptions, VecTxPool, productivity,
};
pub use genesis::Genesis;
pub use protocol::{BlockCtx, ExecutionContext, TipInfo};

// Re-export storage backends.
pub use storage::{
    KvBlockArchive, KvStore, KvStoreFlusher, KvStoreWithBuffer, MemKvStore, RocksDbConfig,
    RocksDbKvStore, StoreError,
};

pub use indexer::{IncrementalIndexer, IndexerConfig, IndexerError, StakingIndexer};
pub use validation::BaseValidity;

// Re-export metrics registry and sink.
pub use metrics::{ChainMetrics, MetricsRegistry, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Type alias for the default block archive backend.
pub type DefaultBlockArchive = KvBlockArchive<RocksDbKvStore>;

/// Type alias for the default chain engine stack.
pub type DefaultBlockchain = Blockchain<DefaultBlockArchive>;
