//! Host registry - coordinates registration, lookup, and eviction.
//!
//! The registry keeps a map from lower-cased username to host plus a vector
//! of the same hosts in registration order. Both live behind one mutex so no
//! observer ever sees them disagree. Probes never run under the lock: callers
//! snapshot hosts, probe, then re-validate the snapshot before mutating.

use crate::error::RegistrationError;
use crate::host::{Host, HostId, Status};
use crate::probe::StatusProber;
use hostdir_protocol::Registration;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    /// Hosts indexed by lower-cased username.
    by_name: HashMap<String, Arc<Host>>,

    /// The same hosts in registration order.
    order: Vec<Arc<Host>>,
}

impl Inner {
    fn remove_key(&mut self, key: &str) -> Option<Arc<Host>> {
        let host = self.by_name.remove(key)?;
        self.order.retain(|h| h.id() != host.id());
        Some(host)
    }

    fn endpoint_in_use(&self, address: &str, port: u16) -> bool {
        self.order.iter().any(|h| h.shares_endpoint(address, port))
    }
}

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Hosts probed.
    pub probed: usize,
    /// Usernames evicted, in registration order.
    pub evicted: Vec<String>,
}

/// The in-memory host directory.
#[derive(Debug)]
pub struct Registry {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Looks up a host by username, ignoring case.
    pub fn lookup(&self, username: &str) -> Option<Arc<Host>> {
        self.inner.lock().by_name.get(&Host::key_for(username)).cloned()
    }

    /// Returns the number of registered hosts.
    pub fn count(&self) -> usize {
        self.inner.lock().order.len()
    }

    /// Returns the host at `index` in registration order.
    ///
    /// Positions shift when earlier hosts are removed, so an index is only
    /// meaningful for the duration of a single call.
    pub fn get_by_index(&self, index: usize) -> Option<Arc<Host>> {
        self.inner.lock().order.get(index).cloned()
    }

    /// Returns all hosts in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Host>> {
        self.inner.lock().order.clone()
    }

    /// Returns whether `host` is still the live registration for its name.
    pub fn contains(&self, host: &Host) -> bool {
        self.inner
            .lock()
            .by_name
            .get(&host.key())
            .is_some_and(|current| current.id() == host.id())
    }

    /// Inserts a host whose liveness was already established.
    ///
    /// Rejects if the username is present or another host advertises the
    /// same `(address, port)`.
    pub fn register(
        &self,
        registration: &Registration,
        status: Status,
    ) -> Result<Arc<Host>, RegistrationError> {
        let port = validate_port(registration.port)?;
        let key = Host::key_for(&registration.username);

        let mut inner = self.inner.lock();
        if inner.by_name.contains_key(&key) {
            return Err(RegistrationError::UsernameTaken {
                username: registration.username.clone(),
            });
        }
        if inner.endpoint_in_use(&registration.address, port) {
            return Err(RegistrationError::AddressInUse {
                address: registration.address.clone(),
                port,
            });
        }

        let id: HostId = self.next_id.fetch_add(1, Ordering::Relaxed);
        let host = Arc::new(Host::new(id, registration, port, status));
        inner.by_name.insert(key, host.clone());
        inner.order.push(host.clone());
        Ok(host)
    }

    /// Removes the host registered under `username`, ignoring case.
    pub fn remove(&self, username: &str) -> Option<Arc<Host>> {
        self.inner.lock().remove_key(&Host::key_for(username))
    }

    /// Removes `host` only if it is still the live registration for its name.
    ///
    /// Returns false if it was already removed or replaced.
    pub fn remove_host(&self, host: &Host) -> bool {
        let mut inner = self.inner.lock();
        let key = host.key();
        let current = inner
            .by_name
            .get(&key)
            .is_some_and(|current| current.id() == host.id());
        if current {
            inner.remove_key(&key);
        }
        current
    }

    /// Admits a registration after vetting it against live servers.
    ///
    /// An existing host under the same name is probed fresh; if it still
    /// answers the registration is refused, otherwise it is evicted. The
    /// candidate endpoint must be unclaimed and answer a probe.
    pub async fn admit(
        &self,
        registration: &Registration,
        prober: &StatusProber,
    ) -> Result<Arc<Host>, RegistrationError> {
        let port = validate_port(registration.port)?;
        let vetting = prober.settings().vetting_timeout;

        if let Some(existing) = self.lookup(&registration.username) {
            if existing.refresh(prober, vetting).await.is_reachable() {
                return Err(RegistrationError::UsernameTaken {
                    username: registration.username.clone(),
                });
            }
            if self.remove_host(&existing) {
                tracing::info!(
                    "Removed {}! (superseded by a new registration)",
                    existing.username()
                );
            }
        }

        // Cheap early rejection; checked again under the lock on insert.
        if self.inner.lock().endpoint_in_use(&registration.address, port) {
            return Err(RegistrationError::AddressInUse {
                address: registration.address.clone(),
                port,
            });
        }

        let status = prober.probe(&registration.address, port, vetting).await;
        if !status.is_reachable() {
            return Err(RegistrationError::Unreachable {
                address: registration.address.clone(),
                port,
            });
        }

        let host = self.register(registration, status)?;
        tracing::info!("Hosting {}!", host.username());
        Ok(host)
    }

    /// Probes every host and evicts the ones that do not answer.
    ///
    /// Hosts are probed in registration order with the cache bypassed. A host
    /// replaced while its probe was in flight is left alone.
    pub async fn sweep(&self, prober: &StatusProber) -> SweepReport {
        let hosts = self.snapshot();
        let mut report = SweepReport {
            probed: hosts.len(),
            evicted: Vec::new(),
        };

        for host in hosts {
            let status = host
                .refresh(prober, prober.settings().refresh_timeout)
                .await;
            if status.is_reachable() {
                continue;
            }
            if self.remove_host(&host) {
                tracing::info!("Removed {}!", host.username());
                report.evicted.push(host.username().to_string());
            }
        }

        report
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        let inner = self.inner.lock();
        assert_eq!(inner.by_name.len(), inner.order.len());
        for host in &inner.order {
            let mapped = inner.by_name.get(&host.key()).expect("host missing from map");
            assert_eq!(mapped.id(), host.id());
        }
    }
}

fn validate_port(port: i32) -> Result<u16, RegistrationError> {
    u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or(RegistrationError::InvalidPort(port))
}
