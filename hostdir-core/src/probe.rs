//! Liveness prober speaking the legacy status query.

use crate::host::Status;
use hostdir_protocol::legacy::{parse_status_line, read_status_line, LegacyStatus};
use hostdir_protocol::STATUS_QUERY;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Timeouts below this are treated as unset.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Timeout used when the requested one is below [`MIN_TIMEOUT`].
pub const FALLBACK_TIMEOUT: Duration = Duration::from_millis(2000);

/// Probe timing settings.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// How long a cached status is reused.
    pub status_ttl: Duration,
    /// Timeout for routine status refreshes and sweeps.
    pub refresh_timeout: Duration,
    /// Timeout for checks made while admitting a registration.
    pub vetting_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            status_ttl: Duration::from_secs(15),
            refresh_timeout: Duration::from_millis(3000),
            vetting_timeout: Duration::from_millis(2000),
        }
    }
}

/// Outbound status query client.
#[derive(Debug, Clone, Default)]
pub struct StatusProber {
    settings: ProbeSettings,
}

impl StatusProber {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Queries `address:port` and returns its status.
    ///
    /// Never fails: refused connections, timeouts, read errors and malformed
    /// lines all produce [`Status::unreachable`]. The whole exchange is bounded
    /// by `timeout`.
    pub async fn probe(&self, address: &str, port: u16, timeout: Duration) -> Status {
        let timeout = if timeout < MIN_TIMEOUT {
            FALLBACK_TIMEOUT
        } else {
            timeout
        };

        match tokio::time::timeout(timeout, query(address, port)).await {
            Ok(Ok(Some(info))) => Status::reachable(info),
            Ok(Ok(None)) => {
                tracing::debug!("{}:{} sent a malformed status line", address, port);
                Status::unreachable()
            }
            Ok(Err(e)) => {
                tracing::debug!("Probe of {}:{} failed: {}", address, port, e);
                Status::unreachable()
            }
            Err(_) => {
                tracing::debug!("Probe of {}:{} timed out after {:?}", address, port, timeout);
                Status::unreachable()
            }
        }
    }
}

async fn query(address: &str, port: u16) -> io::Result<Option<LegacyStatus>> {
    let mut stream = TcpStream::connect((address, port)).await?;
    stream.write_all(&STATUS_QUERY).await?;
    let line = read_status_line(&mut stream).await?;
    Ok(line.as_deref().and_then(parse_status_line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{unused_port, FakeGameServer};
    use std::time::Instant;

    #[tokio::test]
    async fn test_probe_reachable() {
        let server = FakeGameServer::start("A Minecraft Server").await;
        let prober = StatusProber::default();

        let status = prober
            .probe("127.0.0.1", server.port(), Duration::from_secs(2))
            .await;
        let info = status.info().expect("reachable");
        assert_eq!(info.protocol_version, "1.4.2");
        assert_eq!(info.motd, "A Minecraft Server");
        assert_eq!(info.current_players, "3");
        assert_eq!(info.max_players, "20");
        assert_eq!(server.probe_count(), 1);
    }

    #[tokio::test]
    async fn test_probe_tiny_timeout_uses_fallback() {
        let server = FakeGameServer::start("slow start").await;
        let prober = StatusProber::default();

        let status = prober
            .probe("127.0.0.1", server.port(), Duration::from_millis(1))
            .await;
        assert!(status.is_reachable());

        let status = prober
            .probe("127.0.0.1", server.port(), Duration::ZERO)
            .await;
        assert!(status.is_reachable());
    }

    #[tokio::test]
    async fn test_probe_nothing_listening() {
        let port = unused_port().await;
        let prober = StatusProber::default();

        let started = Instant::now();
        let status = prober
            .probe("127.0.0.1", port, Duration::from_millis(500))
            .await;
        assert!(!status.is_reachable());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_probe_silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accepts (via backlog) but never answers.
        let prober = StatusProber::default();

        let started = Instant::now();
        let status = prober
            .probe("127.0.0.1", port, Duration::from_millis(200))
            .await;
        assert!(!status.is_reachable());
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(listener);
    }

    #[tokio::test]
    async fn test_probe_offline_server_closes_without_reply() {
        let server = FakeGameServer::start("motd").await;
        server.set_online(false);
        let status = StatusProber::default()
            .probe("127.0.0.1", server.port(), Duration::from_secs(1))
            .await;
        assert!(!status.is_reachable());
    }
}
