//! Core error types.

use thiserror::Error;

/// Reasons a registration is refused.
///
/// These are expected outcomes reported to the client as a plain `false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("username already hosted: {username}")]
    UsernameTaken { username: String },

    #[error("endpoint already registered: {address}:{port}")]
    AddressInUse { address: String, port: u16 },

    #[error("host unreachable: {address}:{port}")]
    Unreachable { address: String, port: u16 },

    #[error("invalid port: {0}")]
    InvalidPort(i32),
}

impl RegistrationError {
    /// Returns a stable label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            RegistrationError::UsernameTaken { .. } => "username_taken",
            RegistrationError::AddressInUse { .. } => "address_in_use",
            RegistrationError::Unreachable { .. } => "unreachable",
            RegistrationError::InvalidPort(_) => "invalid_port",
        }
    }
}
