//! # hostdir-server
//!
//! TCP server for hostdir.
//!
//! This crate provides:
//! - TCP connection handling with async I/O
//! - Per-connection request sessions and opcode dispatch
//! - A bounded worker pool for requests that probe game servers
//! - Periodic sweeping of unreachable hosts
//! - The `start(port)` / `stop()` service lifecycle
//! - Optional Prometheus metrics

pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod pool;
pub mod server;
pub mod service;
pub mod session;
pub mod sweeper;

pub use config::{
    Config, ConfigError, MetricsConfig, NetworkConfig, PoolConfig, ProbeConfig, SweepConfig,
};
pub use error::ServerError;
pub use handler::RequestHandler;
pub use metrics::Metrics;
pub use pool::WorkerPool;
pub use server::{Server, ServerConfig, ServerStats};
pub use service::DirectoryService;
pub use session::{Session, SessionState};
pub use sweeper::Sweeper;
