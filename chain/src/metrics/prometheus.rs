//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and the strongly-typed [`ChainCollectors`], the
//! [`ChainMetrics`] implementation on top of it, and an async HTTP
//! exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, future::Future, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, header::HeaderValue,
    server::conn::http1, service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{info, warn};

use prometheus::{
    self, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};

use super::ChainMetrics;

/// Chain-related Prometheus collectors.
///
/// These are registered into a [`Registry`] and updated through the
/// [`ChainMetrics`] sink.
#[derive(Clone)]
pub struct ChainCollectors {
    /// Per-block values (gas used, action count, base fee, ...) keyed by
    /// the `type` label.
    pub block: GaugeVec,
    /// Latency of chain operations in seconds, keyed by the `topic` label.
    pub operation_seconds: HistogramVec,
    /// Failed subscriber notifications, keyed by the `subscriber` label.
    pub subscriber_failures: IntCounterVec,
}

impl ChainCollectors {
    /// Registers chain collectors into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let block = GaugeVec::new(
            Opts::new("blockchain_block", "Per-block values of the last minted or committed block"),
            &["type"],
        )?;
        registry.register(Box::new(block.clone()))?;

        let operation_seconds = HistogramVec::new(
            HistogramOpts::new(
                "blockchain_operation_seconds",
                "Time spent in chain operations in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
            &["topic"],
        )?;
        registry.register(Box::new(operation_seconds.clone()))?;

        let subscriber_failures = IntCounterVec::new(
            Opts::new(
                "blockchain_subscriber_failures",
                "Total number of failed block subscriber notifications",
            ),
            &["subscriber"],
        )?;
        registry.register(Box::new(subscriber_failures.clone()))?;

        Ok(Self {
            block,
            operation_seconds,
            subscriber_failures,
        })
    }
}

/// Wrapper around a Prometheus registry and the chain collectors.
///
/// This is the main handle you pass around in the node. It can be wrapped
/// in an [`Arc`] and shared across threads/tasks, and handed to the chain
/// engine as its [`ChainMetrics`] sink.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub chain: ChainCollectors,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the chain collectors.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("chain".to_string()), None)?;
        let chain = ChainCollectors::register(&registry)?;
        Ok(Self { registry, chain })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl ChainMetrics for MetricsRegistry {
    fn observe_duration(&self, topic: &str, secs: f64) {
        self.chain
            .operation_seconds
            .with_label_values(&[topic])
            .observe(secs);
    }

    fn set_block_metric(&self, kind: &str, value: f64) {
        self.chain.block.with_label_values(&[kind]).set(value);
    }

    fn subscriber_failed(&self, subscriber: &str) {
        self.chain
            .subscriber_failures
            .with_label_values(&[subscriber])
            .inc();
    }
}

/// Binds `addr` and serves Prometheus metrics until `shutdown` resolves.
///
/// The server serves `GET /metrics` with the Prometheus text exposition
/// format. All other paths return 404.
///
/// This function is `async` and is intended to be spawned onto a Tokio
/// runtime, e.g.:
///
/// ```ignore
/// let registry = Arc::new(MetricsRegistry::new()?);
/// let addr: SocketAddr = "127.0.0.1:9898".parse()?;
/// tokio::spawn(run_prometheus_http_server(registry.clone(), addr, shutdown_rx));
/// ```
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "metrics exporter listening");
    serve_metrics(listener, metrics, shutdown).await
}

/// Serves metrics on an already bound listener until `shutdown` resolves.
pub async fn serve_metrics(
    listener: TcpListener,
    metrics: Arc<MetricsRegistry>,
    shutdown: impl Future<Output = ()> + Send,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tokio::pin!(shutdown);

    loop {
        let (stream, _) = tokio::select! {
            _ = &mut shutdown => {
                info!("metrics exporter stopped");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                warn!(error = %err, "prometheus HTTP server error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(metrics_response(req.method(), req.uri().path(), &metrics))
}

fn metrics_response(method: &Method, path: &str, metrics: &MetricsRegistry) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => {
            let mut resp = Response::new(Full::new(Bytes::from(metrics.gather_text())));
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            resp
        }
        _ => {
            let mut resp = Response::new(Full::new(Bytes::from("not found")));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            resp
        }
    }
}
