//! Chain engine configuration.
//!
//! This includes chain identity (chain id, EVM network id, chain address),
//! the block producer keys used for minting, and implementation-level
//! limits applied by the base validity checks.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{Address, PrivateKey};

/// Misconfiguration detected while constructing chain components.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid producer private key at position {index}: {reason}")]
    InvalidProducerKey { index: usize, reason: String },

    #[error("invalid producer key range {range:?}: {reason}")]
    InvalidKeyRange { range: String, reason: String },

    #[error("invalid chain address {0:?}")]
    InvalidAddress(String),
}

/// Chain engine configuration parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// Chain id.
    pub id: u32,
    /// EVM network id exposed to contracts.
    pub evm_network_id: u32,
    /// Hex address of the chain's system account; empty if unset.
    pub address: String,
    /// Comma separated hex-encoded Ed25519 producer secrets.
    pub producer_private_keys: String,
    /// Optional `"[start:end]"` slice over `producer_private_keys`.
    pub producer_key_range: String,
    /// Soft limit on the number of actions per block.
    pub max_block_actions: usize,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            id: 1,
            evm_network_id: 4689,
            address: String::new(),
            producer_private_keys: String::new(),
            producer_key_range: String::new(),
            max_block_actions: 10_000,
        }
    }
}

impl BlockchainConfig {
    /// Decodes the configured producer keys, applying the key range.
    ///
    /// An empty key string yields no keys; minting then requires an
    /// explicit key per call.
    pub fn producer_keys(&self) -> Result<Vec<PrivateKey>, ConfigError> {
        let keys = self
            .producer_private_keys
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(index, s)| {
                PrivateKey::from_hex(s).map_err(|e| ConfigError::InvalidProducerKey {
                    index,
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (start, end) = self.key_range(keys.len())?;
        Ok(keys[start..end].to_vec())
    }

    /// Addresses of the configured producer keys.
    pub fn producer_addresses(&self) -> Result<Vec<Address>, ConfigError> {
        Ok(self
            .producer_keys()?
            .iter()
            .map(|k| k.public_key().address())
            .collect())
    }

    fn key_range(&self, len: usize) -> Result<(usize, usize), ConfigError> {
        let raw = self.producer_key_range.trim();
        if raw.is_empty() {
            return Ok((0, len));
        }
        let invalid = |reason: &str| ConfigError::InvalidKeyRange {
            range: raw.to_string(),
            reason: reason.to_string(),
        };

        let inner = raw.trim_matches(|c: char| c == '[' || c == ']');
        let (start, end) = inner
            .split_once(':')
            .ok_or_else(|| invalid("expected \"[start:end]\""))?;
        let start: usize = match start.trim() {
            "" => 0,
            s => s.parse().map_err(|_| invalid("invalid start"))?,
        };
        let end: usize = match end.trim() {
            "" => len,
            s => s.parse().map_err(|_| invalid("invalid end"))?,
        };
        if start > end || end > len {
            return Err(invalid("out of bounds"));
        }
        Ok((start, end))
    }
}
