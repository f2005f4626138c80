//! Top-level configuration for a chain node.
//!
//! This module aggregates configuration for:
//!
//! - chain identity and producer keys (`BlockchainConfig`),
//! - genesis parameters (`Genesis`),
//! - storage (RocksDB path and creation flags),
//! - metrics exporter (enable flag + listen address).
//!
//! Every section has defaults, so a config file only needs to name what it
//! changes. Files are JSON; see [`ChainConfig::from_json`].

use std::net::SocketAddr;

use serde::Deserialize;

use crate::consensus::BlockchainConfig;
use crate::genesis::Genesis;
use crate::storage::RocksDbConfig;

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9898)),
        }
    }
}

/// Top-level configuration for a chain node.
///
/// This aggregates all the sub-configs needed to wire up a typical node:
///
/// - chain engine (`blockchain`),
/// - genesis parameters (`genesis`),
/// - persistent storage (`storage`),
/// - Prometheus metrics exporter (`metrics`).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub blockchain: BlockchainConfig,
    pub genesis: Genesis,
    pub storage: RocksDbConfig,
    pub metrics: MetricsConfig,
}

impl ChainConfig {
    /// Parses a JSON config; missing sections and fields keep defaults.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
