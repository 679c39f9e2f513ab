//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via HOSTDIR_CONFIG)
//! 3. Environment variables

use hostdir_core::ProbeSettings;
use hostdir_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Liveness probe configuration.
    pub probe: ProbeConfig,
    /// Sweeper configuration.
    pub sweep: SweepConfig,
    /// Worker pool configuration.
    pub pool: PoolConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("HOSTDIR_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.probe.apply_env_overrides();
        self.sweep.apply_env_overrides();
        self.pool.apply_env_overrides();
        self.metrics.apply_env_overrides();
    }

    /// Rejects settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.workers == 0 {
            return Err(ConfigError::ValidationError(
                "pool.workers must be at least 1".to_string(),
            ));
        }
        if self.sweep.enabled && self.sweep.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "sweep.interval_secs must be positive".to_string(),
            ));
        }
        if self.probe.refresh_timeout_ms == 0 || self.probe.vetting_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "probe timeouts must be positive".to_string(),
            ));
        }
        if self.network.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "network.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Deadline for a client to send its complete request, in seconds.
    pub read_timeout_secs: u64,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            read_timeout_secs: 10,
            max_connections: 1024,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("HOSTDIR_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(timeout) = std::env::var("HOSTDIR_READ_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.read_timeout_secs = secs;
            }
        }

        if let Ok(max) = std::env::var("HOSTDIR_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }
    }

    /// Returns the request read deadline as Duration.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Liveness probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// How long a probed status is reused, in seconds.
    pub status_ttl_secs: u64,
    /// Timeout for status refreshes and sweeps, in milliseconds.
    pub refresh_timeout_ms: u64,
    /// Timeout for registration-time checks, in milliseconds.
    pub vetting_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            status_ttl_secs: 15,
            refresh_timeout_ms: 3000,
            vetting_timeout_ms: 2000,
        }
    }
}

impl ProbeConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(ttl) = std::env::var("HOSTDIR_STATUS_TTL") {
            if let Ok(secs) = ttl.parse() {
                self.status_ttl_secs = secs;
            }
        }

        if let Ok(timeout) = std::env::var("HOSTDIR_PROBE_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.refresh_timeout_ms = ms;
            }
        }

        if let Ok(timeout) = std::env::var("HOSTDIR_VETTING_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.vetting_timeout_ms = ms;
            }
        }
    }

    /// Converts to the prober's settings.
    pub fn settings(&self) -> ProbeSettings {
        ProbeSettings {
            status_ttl: Duration::from_secs(self.status_ttl_secs),
            refresh_timeout: Duration::from_millis(self.refresh_timeout_ms),
            vetting_timeout: Duration::from_millis(self.vetting_timeout_ms),
        }
    }
}

/// Sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Enable periodic eviction of unreachable hosts.
    pub enabled: bool,
    /// Delay before the first sweep, in seconds.
    pub initial_delay_secs: u64,
    /// Period between sweeps, in seconds.
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_secs: 20,
            interval_secs: 30,
        }
    }
}

impl SweepConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("HOSTDIR_SWEEP_ENABLED") {
            self.enabled = enabled == "1" || enabled.to_lowercase() == "true";
        }

        if let Ok(delay) = std::env::var("HOSTDIR_SWEEP_DELAY") {
            if let Ok(secs) = delay.parse() {
                self.initial_delay_secs = secs;
            }
        }

        if let Ok(interval) = std::env::var("HOSTDIR_SWEEP_INTERVAL") {
            if let Ok(secs) = interval.parse() {
                self.interval_secs = secs;
            }
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of requests probing or registering at once.
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl PoolConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(workers) = std::env::var("HOSTDIR_WORKERS") {
            if let Ok(n) = workers.parse() {
                self.workers = n;
            }
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics HTTP server.
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics server to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
        }
    }
}

impl MetricsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("HOSTDIR_METRICS_ENABLED") {
            self.enabled = enabled == "1" || enabled.to_lowercase() == "true";
        }
        if let Ok(addr) = std::env::var("HOSTDIR_METRICS_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
