//! Registered hosts and their cached status.

use crate::probe::StatusProber;
use hostdir_protocol::{LegacyStatus, Registration};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Identity of one registration. Never reused within a registry.
pub type HostId = u64;

/// Liveness snapshot of a host.
#[derive(Debug, Clone)]
pub struct Status {
    /// Server-reported fields; present iff the host answered the probe.
    info: Option<LegacyStatus>,
    taken_at: Instant,
}

impl Status {
    /// A status for a host that did not answer.
    pub fn unreachable() -> Self {
        Self {
            info: None,
            taken_at: Instant::now(),
        }
    }

    /// A status for a host that answered with `info`.
    pub fn reachable(info: LegacyStatus) -> Self {
        Self {
            info: Some(info),
            taken_at: Instant::now(),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.info.is_some()
    }

    pub fn info(&self) -> Option<&LegacyStatus> {
        self.info.as_ref()
    }

    /// Returns the time since this status was taken.
    pub fn age(&self) -> Duration {
        self.taken_at.elapsed()
    }

    /// Returns whether this status is younger than `ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

/// A registered host.
#[derive(Debug)]
pub struct Host {
    id: HostId,
    username: String,
    owner_id: Uuid,
    address: String,
    port: u16,
    password_digest: Option<String>,
    status: Mutex<Status>,
}

impl Host {
    pub(crate) fn new(id: HostId, registration: &Registration, port: u16, status: Status) -> Self {
        Self {
            id,
            username: registration.username.clone(),
            owner_id: registration.owner_id,
            address: registration.address.clone(),
            port,
            password_digest: registration
                .password_digest
                .clone()
                .filter(|d| !d.is_empty()),
            status: Mutex::new(status),
        }
    }

    /// Returns the registry key for a username.
    pub fn key_for(username: &str) -> String {
        username.to_lowercase()
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    /// Returns the username in its registered casing.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn key(&self) -> String {
        Self::key_for(&self.username)
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns `address:port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn password_digest(&self) -> Option<&str> {
        self.password_digest.as_deref()
    }

    pub fn has_password(&self) -> bool {
        self.password_digest.is_some()
    }

    /// Returns whether this host advertises the given endpoint.
    pub fn shares_endpoint(&self, address: &str, port: u16) -> bool {
        self.port == port && self.address == address
    }

    /// Returns the last status taken, regardless of age.
    pub fn last_status(&self) -> Status {
        self.status.lock().clone()
    }

    /// Returns the cached status, reprobing if it is older than the TTL.
    pub async fn status(&self, prober: &StatusProber) -> Status {
        let cached = self.last_status();
        if cached.is_fresh(prober.settings().status_ttl) {
            return cached;
        }
        self.refresh(prober, prober.settings().refresh_timeout).await
    }

    /// Probes the host now and replaces the cached status.
    pub async fn refresh(&self, prober: &StatusProber, timeout: Duration) -> Status {
        let status = prober.probe(&self.address, self.port, timeout).await;
        *self.status.lock() = status.clone();
        status
    }

    /// Returns whether the (possibly cached) status is reachable.
    pub async fn check_available(&self, prober: &StatusProber) -> bool {
        self.status(prober).await.is_reachable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(status: Status) -> Host {
        let reg = Registration::new("Alice", "10.0.0.5", 25565).with_password_digest("");
        Host::new(1, &reg, 25565, status)
    }

    #[test]
    fn test_host_accessors() {
        let host = host(Status::unreachable());
        assert_eq!(host.username(), "Alice");
        assert_eq!(host.key(), "alice");
        assert_eq!(host.endpoint(), "10.0.0.5:25565");
        assert!(!host.has_password());
        assert!(host.shares_endpoint("10.0.0.5", 25565));
        assert!(!host.shares_endpoint("10.0.0.5", 25566));
        assert!(!host.shares_endpoint("10.0.0.6", 25565));
    }

    #[test]
    fn test_status_freshness() {
        let status = Status::reachable(LegacyStatus::default());
        assert!(status.is_reachable());
        assert!(status.is_fresh(Duration::from_secs(15)));
        assert!(!status.is_fresh(Duration::ZERO));
        assert!(Status::unreachable().info().is_none());
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_probe() {
        // Nothing listens on the host's endpoint; a probe would flip the status.
        let host = host(Status::reachable(LegacyStatus::default()));
        let prober = StatusProber::default();
        assert!(host.check_available(&prober).await);
    }
}
