//! Protocol-level context and fee rules shared by validation and minting.

pub mod context;
pub mod fee;

pub use context::{BlockCtx, BlockchainCtx, ExecutionContext, FeatureCtx, TipInfo};
pub use fee::{FeeError, calc_base_fee, calc_excess_blob_gas, verify_eip1559_header};
