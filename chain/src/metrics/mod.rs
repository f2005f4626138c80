//! Metrics and instrumentation for the chain.
//!
//! The chain engine reports through the [`ChainMetrics`] sink it receives
//! at construction; nothing here is a process-wide global. This module
//! provides:
//!
//! - [`NoopMetrics`], the default sink,
//! - [`MetricsRegistry`], a Prometheus-backed sink, plus a small HTTP
//!   exporter that serves `/metrics` in Prometheus text format.
//!
//! Typical usage in a node:
//!
//! ```ignore
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use chain_core::metrics::{MetricsRegistry, run_prometheus_http_server};
//!
//! let registry = Arc::new(MetricsRegistry::new()?);
//! let addr: SocketAddr = "127.0.0.1:9898".parse()?;
//!
//! // Spawn the HTTP exporter in the background:
//! tokio::spawn(run_prometheus_http_server(registry.clone(), addr, shutdown));
//!
//! // Hand the same registry to the chain:
//! let options = ChainOptions { metrics: Some(registry), ..Default::default() };
//! ```

pub mod prometheus;

pub use self::prometheus::{
    ChainCollectors, MetricsRegistry, run_prometheus_http_server, serve_metrics,
};

/// Sink for chain instrumentation.
pub trait ChainMetrics: Send + Sync {
    /// Records how long the operation `topic` took.
    fn observe_duration(&self, topic: &str, secs: f64);

    /// Sets a per-block gauge such as `"gasUsed"` or `"MintActions"`.
    fn set_block_metric(&self, kind: &str, value: f64);

    /// Counts a failed notification of the named subscriber.
    fn subscriber_failed(&self, subscriber: &str);
}

/// Sink that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl ChainMetrics for NoopMetrics {
    fn observe_duration(&self, _topic: &str, _secs: f64) {}

    fn set_block_metric(&self, _kind: &str, _value: f64) {}

    fn subscriber_failed(&self, _subscriber: &str) {}
}
