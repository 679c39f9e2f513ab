//! Periodic eviction of unreachable hosts.

use crate::config::SweepConfig;
use crate::metrics::Metrics;
use hostdir_core::{Registry, StatusProber, SweepReport};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};

/// Sweeps the registry on a fixed schedule.
pub struct Sweeper {
    registry: Arc<Registry>,
    prober: Arc<StatusProber>,
    config: SweepConfig,
    metrics: Option<Arc<Metrics>>,
}

impl Sweeper {
    pub fn new(registry: Arc<Registry>, prober: Arc<StatusProber>, config: SweepConfig) -> Self {
        Self {
            registry,
            prober,
            config,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Probes every host once and evicts the unreachable ones.
    pub async fn sweep_once(&self) -> SweepReport {
        let report = self.registry.sweep(&self.prober).await;

        if let Some(ref metrics) = self.metrics {
            metrics.evictions_total.inc_by(report.evicted.len() as f64);
            metrics.hosts_registered.set(self.registry.count() as f64);
        }

        if report.evicted.is_empty() {
            tracing::debug!("Sweep complete: {} hosts probed", report.probed);
        } else {
            tracing::info!(
                "Sweep complete: {} hosts probed, {} evicted",
                report.probed,
                report.evicted.len()
            );
        }
        report
    }

    /// Runs the sweep loop until `shutdown` fires (call from a background task).
    ///
    /// A sweep in progress is abandoned on shutdown.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Sweeper is disabled");
            return;
        }

        tracing::info!(
            "Sweeper started (initial_delay={}s, interval={}s)",
            self.config.initial_delay_secs,
            self.config.interval_secs
        );

        let start = Instant::now() + self.config.initial_delay();
        let mut ticker = tokio::time::interval_at(start, self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.sweep_once() => {}
                        _ = shutdown.recv() => break,
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Sweeper stopped");
    }
}
