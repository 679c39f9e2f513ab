//! Service lifecycle: `start(port)` and `stop()`.

use crate::config::Config;
use crate::error::ServerError;
use crate::handler::RequestHandler;
use crate::metrics::{run_metrics_server, Metrics};
use crate::pool::WorkerPool;
use crate::server::{Server, ServerConfig};
use crate::sweeper::Sweeper;
use hostdir_core::{Registry, StatusProber};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// A started service.
struct Running {
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    shutdown: broadcast::Sender<()>,
    pool: WorkerPool,
    /// Cleared when the accept loop dies on its own.
    alive: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Running {
    async fn teardown(self) {
        self.pool.close();
        let _ = self.shutdown.send(());
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// The host directory service.
///
/// Each start begins with an empty directory; hosts re-register after a
/// restart.
pub struct DirectoryService {
    config: Config,
    prober: Arc<StatusProber>,
    state: Mutex<Option<Running>>,
}

impl Default for DirectoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryService {
    /// Creates a service with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a service with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let prober = StatusProber::new(config.probe.settings());
        Self {
            config,
            prober: Arc::new(prober),
            state: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the directory of the running service.
    pub async fn registry(&self) -> Option<Arc<Registry>> {
        self.state.lock().await.as_ref().map(|r| r.registry.clone())
    }

    /// Returns whether the listener is up.
    pub async fn is_running(&self) -> bool {
        self.state
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| r.alive.load(Ordering::SeqCst))
    }

    /// Returns the bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.state
            .lock()
            .await
            .as_ref()
            .filter(|r| r.alive.load(Ordering::SeqCst))
            .map(|r| r.local_addr)
    }

    /// Starts listening on `port` on the configured interface.
    ///
    /// Port 0 picks a free port; the bound address is returned.
    pub async fn start(&self, port: u16) -> Result<SocketAddr, ServerError> {
        let mut bind_addr = self.config.network.bind_addr;
        bind_addr.set_port(port);
        self.start_on(bind_addr).await
    }

    /// Starts listening on the configured bind address.
    pub async fn start_configured(&self) -> Result<SocketAddr, ServerError> {
        self.start_on(self.config.network.bind_addr).await
    }

    async fn start_on(&self, bind_addr: SocketAddr) -> Result<SocketAddr, ServerError> {
        let mut state = self.state.lock().await;
        if let Some(running) = state.take() {
            if running.alive.load(Ordering::SeqCst) {
                *state = Some(running);
                return Err(ServerError::AlreadyRunning);
            }
            // The accept loop died; reap what is left before starting over.
            running.teardown().await;
        }

        self.config.validate()?;

        let registry = Arc::new(Registry::new());
        let metrics = if self.config.metrics.enabled {
            Some(Arc::new(Metrics::new()?))
        } else {
            None
        };

        let (shutdown, _) = broadcast::channel(1);
        let mut pool = WorkerPool::new(self.config.pool.workers, shutdown.clone());
        let mut handler = RequestHandler::new(registry.clone(), self.prober.clone());
        let mut server_config = ServerConfig::new(bind_addr);
        server_config.read_timeout = self.config.network.read_timeout();
        server_config.max_connections = self.config.network.max_connections;
        let mut sweeper = Sweeper::new(
            registry.clone(),
            self.prober.clone(),
            self.config.sweep.clone(),
        );
        if let Some(ref metrics) = metrics {
            pool = pool.with_metrics(metrics.clone());
            handler = handler.with_metrics(metrics.clone());
            server_config = server_config.with_metrics(metrics.clone());
            sweeper = sweeper.with_metrics(metrics.clone());
        }

        let server = Server::bind(
            server_config,
            Arc::new(handler),
            pool.clone(),
            shutdown.clone(),
        )
        .await?;
        let local_addr = server.local_addr();

        let metrics_listener = match metrics {
            Some(ref metrics) => {
                let addr = self.config.metrics.bind_addr;
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|source| ServerError::Bind { addr, source })?;
                Some((listener, metrics.clone()))
            }
            None => None,
        };

        let alive = Arc::new(AtomicBool::new(true));
        let mut tasks = Vec::with_capacity(3);

        tasks.push({
            let alive = alive.clone();
            let pool = pool.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    tracing::error!("Directory service stopped: {}", e);
                    alive.store(false, Ordering::SeqCst);
                    pool.close();
                    let _ = shutdown.send(());
                }
            })
        });

        tasks.push({
            let rx = shutdown.subscribe();
            tokio::spawn(async move { sweeper.run(rx).await })
        });

        if let Some((listener, metrics)) = metrics_listener {
            let rx = shutdown.subscribe();
            tasks.push(tokio::spawn(run_metrics_server(listener, metrics, rx)));
        }

        tracing::info!(
            "Directory service started on {} ({} workers)",
            local_addr,
            self.config.pool.workers
        );

        *state = Some(Running {
            local_addr,
            registry,
            shutdown,
            pool,
            alive,
            tasks,
        });
        Ok(local_addr)
    }

    /// Stops the listener, the sweeper and all pooled work, and drops the
    /// directory.
    ///
    /// Fails with [`ServerError::NotRunning`] if not started, or if the
    /// listener already died on its own.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let running = self.state.lock().await.take().ok_or(ServerError::NotRunning)?;
        let alive = running.alive.swap(false, Ordering::SeqCst);
        running.teardown().await;

        if !alive {
            return Err(ServerError::NotRunning);
        }
        tracing::info!("Directory service stopped");
        Ok(())
    }
}
