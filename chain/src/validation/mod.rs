//! Block validity predicates for the chain.
//!
//! This module implements concrete block validators that plug into the
//! chain engine via [`crate::consensus::validator::BlockValidator`].
//!
//! It currently provides:
//!
//! - [`base::BaseValidity`]: cheap structural checks over actions,
//!   receipts and gas.

pub mod base;

pub use base::BaseValidity;
