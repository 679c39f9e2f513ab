//! TCP server implementation.
//!
//! One task runs the accept loop and spawns a task per connection. Each
//! connection carries a single request: cheap requests are answered on the
//! connection task, requests that probe a game server are handed to the
//! worker pool together with the socket.

use crate::error::ServerError;
use crate::handler::RequestHandler;
use crate::metrics::Metrics;
use crate::pool::WorkerPool;
use crate::session::Session;
use hostdir_protocol::codec::{read_fields, read_opcode};
use hostdir_protocol::{Encoder, ProtocolError, Request};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Deadline for reading a complete request.
    pub read_timeout: Duration,
    /// Maximum connections being read or answered by their own task.
    /// Sockets waiting in the worker pool do not count.
    pub max_connections: usize,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("read_timeout", &self.read_timeout)
            .field("max_connections", &self.max_connections)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            read_timeout: Duration::from_secs(10),
            max_connections: 1024,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    /// Open connections not yet handed to the worker pool.
    pub connections_held: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// Tracks one open connection; released when the socket is done with,
/// whichever task ends up owning it.
struct ConnectionGuard {
    stats: Arc<ServerStats>,
    metrics: Option<Arc<Metrics>>,
    held: bool,
}

impl ConnectionGuard {
    fn open(stats: Arc<ServerStats>, metrics: Option<Arc<Metrics>>) -> Self {
        stats.connections_total.fetch_add(1, Ordering::Relaxed);
        stats.connections_active.fetch_add(1, Ordering::Relaxed);
        stats.connections_held.fetch_add(1, Ordering::Relaxed);
        if let Some(ref metrics) = metrics {
            metrics.connections_total.inc();
            metrics.connections_active.inc();
        }
        Self {
            stats,
            metrics,
            held: true,
        }
    }

    /// Frees the connection's slot under `max_connections` once the socket
    /// is queued in the worker pool.
    fn release_slot(&mut self) {
        if std::mem::take(&mut self.held) {
            self.stats.connections_held.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.release_slot();
        self.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
        if let Some(ref metrics) = self.metrics {
            metrics.connections_active.dec();
        }
    }
}

/// State shared by every connection task.
#[derive(Clone)]
struct Context {
    handler: Arc<RequestHandler>,
    pool: WorkerPool,
    stats: Arc<ServerStats>,
    config: ServerConfig,
}

impl Context {
    /// Logs and counts an error that ended a connection.
    fn record_error(&self, addr: SocketAddr, e: &ServerError) {
        tracing::debug!("Connection {} error: {}", addr, e);
        self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
        if let Some(ref metrics) = self.config.metrics {
            metrics.errors_total.with_label_values(&[e.kind()]).inc();
        }
    }
}

/// TCP server for the directory protocol.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: Context,
    shutdown: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Server {
    /// Binds the listening socket.
    pub async fn bind(
        config: ServerConfig,
        handler: Arc<RequestHandler>,
        pool: WorkerPool,
        shutdown: broadcast::Sender<()>,
    ) -> Result<Self, ServerError> {
        let addr = config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        let shutdown_rx = shutdown.subscribe();

        Ok(Self {
            listener,
            local_addr,
            ctx: Context {
                handler,
                pool,
                stats: Arc::new(ServerStats::default()),
                config,
            },
            shutdown,
            shutdown_rx,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns server statistics.
    pub fn stats(&self) -> Arc<ServerStats> {
        self.ctx.stats.clone()
    }

    /// Runs the accept loop until shutdown or a fatal accept error.
    ///
    /// Shutdown signals sent any time after [`Server::bind`] are observed.
    pub async fn run(mut self) -> Result<(), ServerError> {
        tracing::info!("Server listening on {}", self.local_addr);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.dispatch(stream, addr),
                        Err(e) if is_transient(&e) => {
                            tracing::warn!("Accept error: {}", e);
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                            return Err(ServerError::Io(e));
                        }
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Spawns the task serving one accepted connection.
    fn dispatch(&self, stream: TcpStream, addr: SocketAddr) {
        let ctx = &self.ctx;
        if ctx.stats.connections_held.load(Ordering::Relaxed)
            >= ctx.config.max_connections as u64
        {
            ctx.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
            if let Some(ref metrics) = ctx.config.metrics {
                metrics.errors_total.with_label_values(&["rejected"]).inc();
            }
            tracing::warn!(
                "Connection limit ({}) reached, rejecting {}",
                ctx.config.max_connections,
                addr
            );
            return;
        }

        let guard = ConnectionGuard::open(ctx.stats.clone(), ctx.config.metrics.clone());
        let ctx = ctx.clone();
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            tracing::debug!("Client connected: {}", addr);
            let result = tokio::select! {
                result = Self::handle_connection(stream, addr, ctx.clone(), guard) => result,
                _ = shutdown.recv() => Err(ServerError::ShuttingDown),
            };
            if let Err(e) = result {
                ctx.record_error(addr, &e);
            }
        });
    }

    /// Reads the request and either serves it or hands it to the pool.
    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        ctx: Context,
        mut guard: ConnectionGuard,
    ) -> Result<(), ServerError> {
        let mut session = Session::new(addr);

        let request = tokio::time::timeout(
            ctx.config.read_timeout,
            Self::read_request(&mut stream, &mut session),
        )
        .await
        .map_err(|_| ServerError::Timeout)??;
        session.fields_read();

        ctx.stats.requests_total.fetch_add(1, Ordering::Relaxed);
        if let Some(ref metrics) = ctx.config.metrics {
            metrics
                .requests_total
                .with_label_values(&[request.opcode().name()])
                .inc();
        }
        tracing::debug!("[{}] Request: {}", addr, request.opcode().name());

        if RequestHandler::needs_worker(&request) {
            guard.release_slot();
            let pool = ctx.pool.clone();
            pool.submit(async move {
                let _guard = guard;
                if let Err(e) = Self::respond(stream, session, request, &ctx).await {
                    ctx.record_error(addr, &e);
                }
            });
            return Ok(());
        }

        let _guard = guard;
        Self::respond(stream, session, request, &ctx).await
    }

    async fn read_request(
        stream: &mut TcpStream,
        session: &mut Session,
    ) -> Result<Request, ProtocolError> {
        let opcode = read_opcode(stream).await?;
        session.opcode_read(opcode);
        read_fields(stream, opcode).await
    }

    /// Executes the request, writes the response and closes the socket.
    async fn respond(
        mut stream: TcpStream,
        mut session: Session,
        request: Request,
        ctx: &Context,
    ) -> Result<(), ServerError> {
        let started = Instant::now();
        let opcode = request.opcode();

        let response = ctx.handler.handle(request).await;
        session.responding();

        let bytes = Encoder::encode_response(&response)?;
        if !bytes.is_empty() {
            stream.write_all(&bytes).await?;
        }
        // The peer reads until close; a failed shutdown only means it left.
        let _ = stream.shutdown().await;
        session.close();

        if let Some(ref metrics) = ctx.config.metrics {
            metrics
                .request_duration
                .with_label_values(&[opcode.name()])
                .observe(started.elapsed().as_secs_f64());
        }
        tracing::debug!(
            "[{}] Served {} in {:?} (session {})",
            session.remote_addr,
            opcode.name(),
            session.age(),
            session.id
        );
        Ok(())
    }
}

/// Accept errors that concern a single connection rather than the listener.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}
