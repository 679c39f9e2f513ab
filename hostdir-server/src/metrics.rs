//! Prometheus metrics for the hostdir server.
//!
//! This module provides:
//! - Metrics registry with counters, gauges, and histograms
//! - HTTP server to expose metrics at `/metrics` endpoint

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Request duration histogram buckets (in seconds). Probes dominate.
const DURATION_BUCKETS: &[f64] = &[0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0];

/// Prometheus metrics for the directory service.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Total connections accepted.
    pub connections_total: Counter,
    /// Currently active connections.
    pub connections_active: Gauge,
    /// Total requests by opcode.
    pub requests_total: CounterVec,
    /// Connections dropped on a protocol or I/O error, by kind.
    pub errors_total: CounterVec,
    /// Request duration histogram by opcode.
    pub request_duration: HistogramVec,
    /// Registration attempts by outcome.
    pub registrations_total: CounterVec,
    /// Hosts evicted by the sweeper.
    pub evictions_total: Counter,
    /// Currently registered hosts.
    pub hosts_registered: Gauge,
    /// Requests waiting for a worker.
    pub pool_queued: Gauge,
}

impl Metrics {
    /// Creates a new Metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let connections_total = Counter::with_opts(Opts::new(
            "hostdir_connections_total",
            "Total number of connections accepted",
        ))?;
        registry.register(Box::new(connections_total.clone()))?;

        let connections_active = Gauge::with_opts(Opts::new(
            "hostdir_connections_active",
            "Number of currently active connections",
        ))?;
        registry.register(Box::new(connections_active.clone()))?;

        let requests_total = CounterVec::new(
            Opts::new("hostdir_requests_total", "Total requests by opcode"),
            &["opcode"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let errors_total = CounterVec::new(
            Opts::new(
                "hostdir_errors_total",
                "Connections dropped on error, by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "hostdir_request_duration_seconds",
                "Request duration in seconds by opcode",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["opcode"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let registrations_total = CounterVec::new(
            Opts::new(
                "hostdir_registrations_total",
                "Registration attempts by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(registrations_total.clone()))?;

        let evictions_total = Counter::with_opts(Opts::new(
            "hostdir_evictions_total",
            "Hosts evicted after failing a sweep probe",
        ))?;
        registry.register(Box::new(evictions_total.clone()))?;

        let hosts_registered = Gauge::with_opts(Opts::new(
            "hostdir_hosts_registered",
            "Number of currently registered hosts",
        ))?;
        registry.register(Box::new(hosts_registered.clone()))?;

        let pool_queued = Gauge::with_opts(Opts::new(
            "hostdir_pool_queued",
            "Requests waiting for a worker",
        ))?;
        registry.register(Box::new(pool_queued.clone()))?;

        Ok(Self {
            registry,
            connections_total,
            connections_active,
            requests_total,
            errors_total,
            request_duration,
            registrations_total,
            evictions_total,
            hosts_registered,
            pool_queued,
        })
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        buffer
    }
}

/// Runs the HTTP metrics server on an already bound listener.
///
/// Serves metrics at `/metrics` until `shutdown` fires.
pub async fn run_metrics_server(
    listener: TcpListener,
    metrics: Arc<Metrics>,
    mut shutdown: broadcast::Receiver<()>,
) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Metrics server listening on http://{}/metrics", addr);
    }

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                async move { handle_request(req, metrics).await }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                tracing::debug!("Metrics connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Metrics server accept error: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Metrics server shutting down");
                break;
            }
        }
    }
}

fn reply(
    status: StatusCode,
    content_type: Option<&'static str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

/// Handles an HTTP request to the metrics server.
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => reply(
            StatusCode::OK,
            Some("text/plain; version=0.0.4; charset=utf-8"),
            Bytes::from(metrics.encode()),
        ),
        "/health" | "/healthz" => reply(StatusCode::OK, None, Bytes::from_static(b"OK")),
        _ => reply(
            StatusCode::NOT_FOUND,
            None,
            Bytes::from_static(b"Not Found"),
        ),
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();

        metrics.connections_total.inc();
        metrics.connections_active.inc();
        metrics.requests_total.with_label_values(&["count"]).inc();
        metrics.errors_total.with_label_values(&["eof"]).inc();
        metrics
            .registrations_total
            .with_label_values(&["accepted"])
            .inc();
        metrics
            .request_duration
            .with_label_values(&["register"])
            .observe(0.2);
        metrics.evictions_total.inc();
        metrics.hosts_registered.set(3.0);

        let encoded = String::from_utf8(metrics.encode()).unwrap();
        assert!(encoded.contains("hostdir_connections_total 1"));
        assert!(encoded.contains("hostdir_requests_total{opcode=\"count\"} 1"));
        assert!(encoded.contains("hostdir_registrations_total{outcome=\"accepted\"} 1"));
        assert!(encoded.contains("hostdir_request_duration_seconds"));
        assert!(encoded.contains("hostdir_evictions_total 1"));
        assert!(encoded.contains("hostdir_hosts_registered 3"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.hosts_registered.set(2.0);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let server = tokio::spawn(run_metrics_server(listener, metrics, shutdown_rx));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut body = String::new();
        stream.read_to_string(&mut body).await.unwrap();
        assert!(body.starts_with("HTTP/1.1 200 OK"));
        assert!(body.contains("hostdir_hosts_registered 2"));

        shutdown_tx.send(()).unwrap();
        server.await.unwrap();
    }
}
