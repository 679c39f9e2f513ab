//! Bounded worker pool for requests that probe or register.
//!
//! Jobs are spawned immediately and wait for one of a fixed number of
//! permits, so submitting never blocks the caller. The semaphore hands out
//! permits in FIFO order, so a saturated pool queues rather than drops.

use crate::metrics::Metrics;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};

/// Runs at most `workers` jobs at once.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    workers: usize,
    queued: Arc<AtomicUsize>,
    shutdown: broadcast::Sender<()>,
    metrics: Option<Arc<Metrics>>,
}

impl WorkerPool {
    /// Creates a pool whose jobs are abandoned when `shutdown` fires.
    pub fn new(workers: usize, shutdown: broadcast::Sender<()>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
            queued: Arc::new(AtomicUsize::new(0)),
            shutdown,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Number of jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    /// Number of jobs currently running.
    pub fn busy(&self) -> usize {
        self.workers - self.semaphore.available_permits().min(self.workers)
    }

    /// Queues `job` and returns immediately.
    ///
    /// The job is dropped without running if the pool is closed first, and
    /// interrupted if shutdown fires while it runs.
    pub fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let queued = self.queued.clone();
        let metrics = self.metrics.clone();
        let mut shutdown = self.shutdown.subscribe();

        queued.fetch_add(1, Ordering::Relaxed);
        if let Some(ref metrics) = metrics {
            metrics.pool_queued.inc();
        }

        tokio::spawn(async move {
            let permit = tokio::select! {
                permit = semaphore.acquire_owned() => permit.ok(),
                _ = shutdown.recv() => None,
            };

            queued.fetch_sub(1, Ordering::Relaxed);
            if let Some(ref metrics) = metrics {
                metrics.pool_queued.dec();
            }

            let Some(_permit) = permit else {
                tracing::debug!("Worker pool closed, dropping queued job");
                return;
            };

            tokio::select! {
                _ = job => {}
                _ = shutdown.recv() => {
                    tracing::debug!("Worker job interrupted by shutdown");
                }
            }
        });
    }

    /// Stops handing out permits. Queued jobs never start.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}
