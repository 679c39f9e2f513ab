//! Request handlers.

use crate::metrics::Metrics;
use hostdir_core::password;
use hostdir_core::{Host, Registry, StatusProber};
use hostdir_protocol::{Registration, Request, Response, StatusReply};
use std::sync::Arc;

/// Executes decoded requests against the registry.
pub struct RequestHandler {
    registry: Arc<Registry>,
    prober: Arc<StatusProber>,
    /// Metrics for registration tracking.
    metrics: Option<Arc<Metrics>>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(registry: Arc<Registry>, prober: Arc<StatusProber>) -> Self {
        Self {
            registry,
            prober,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns whether serving `request` may probe a game server.
    ///
    /// Such requests go to the worker pool instead of the connection task.
    pub fn needs_worker(request: &Request) -> bool {
        matches!(request, Request::HostStatus { .. } | Request::Register(_))
    }

    /// Serves one request.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Count => Response::Count(self.count()),
            Request::HostStatus { index } => {
                Response::HostStatus(self.host_status(index).await)
            }
            Request::Connect { index, password } => {
                Response::Connect(self.connect(index, &password))
            }
            Request::Register(registration) => {
                Response::Registered(self.register(&registration).await)
            }
            Request::Unknown(code) => {
                tracing::debug!("Ignoring unknown opcode {}", code);
                Response::Empty
            }
        }
    }

    /// Opcode 0: number of registered hosts.
    pub fn count(&self) -> u32 {
        u32::try_from(self.registry.count()).unwrap_or(u32::MAX)
    }

    /// Opcode 1: public status of the host at `index`.
    ///
    /// Uses the cached status while it is fresh. An unreachable host is still
    /// described, with empty version and motd and `0/0` players.
    pub async fn host_status(&self, index: i32) -> Option<StatusReply> {
        let host = self.host_at(index)?;
        let status = host.status(&self.prober).await;

        let reply = match status.info() {
            Some(info) => StatusReply::new(
                host.username(),
                host.owner_id(),
                host.has_password(),
                info.protocol_version.clone(),
                &info.motd,
                &info.current_players,
                &info.max_players,
            ),
            None => StatusReply::new(
                host.username(),
                host.owner_id(),
                host.has_password(),
                "",
                "",
                "0",
                "0",
            ),
        };
        Some(reply)
    }

    /// Opcode 2: trades an index and password for the host's endpoint.
    ///
    /// An empty password means none was supplied.
    pub fn connect(&self, index: i32, password: &[u8]) -> Option<String> {
        let host = self.host_at(index)?;
        let provided = (!password.is_empty()).then_some(password);
        if password::matches(provided, host.password_digest()) {
            Some(host.endpoint())
        } else {
            tracing::debug!("Wrong password for {}", host.username());
            None
        }
    }

    /// Opcode 20: admits a new host.
    pub async fn register(&self, registration: &Registration) -> bool {
        let result = self.registry.admit(registration, &self.prober).await;

        let outcome = match &result {
            Ok(_) => "accepted",
            Err(e) => e.reason(),
        };
        if let Some(ref metrics) = self.metrics {
            metrics.registrations_total.with_label_values(&[outcome]).inc();
            metrics.hosts_registered.set(self.registry.count() as f64);
        }

        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::info!(
                    "Rejected registration of {}: {}",
                    registration.username,
                    e
                );
                false
            }
        }
    }

    /// Resolves an index; negative and out of range indices yield none.
    fn host_at(&self, index: i32) -> Option<Arc<Host>> {
        let index = usize::try_from(index).ok()?;
        self.registry.get_by_index(index)
    }
}
