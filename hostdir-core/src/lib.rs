//! # hostdir-core
//!
//! Host directory for hostdir.
//!
//! This crate provides:
//! - The host registry (case-insensitive names, registration order)
//! - Liveness probing with a TTL status cache
//! - Admission of new hosts and periodic sweeping of dead ones
//! - Password digests

pub mod error;
pub mod host;
pub mod password;
pub mod probe;
pub mod registry;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::RegistrationError;
pub use host::{Host, HostId, Status};
pub use probe::{ProbeSettings, StatusProber};
pub use registry::{Registry, SweepReport};
