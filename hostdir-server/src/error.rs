//! Server error types.

use crate::config::ConfigError;
use std::net::SocketAddr;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] hostdir_protocol::ProtocolError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("service already running")]
    AlreadyRunning,

    #[error("service not running")]
    NotRunning,

    #[error("server shutting down")]
    ShuttingDown,

    #[error("request timed out")]
    Timeout,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ServerError {
    /// Returns a short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Io(_) => "io",
            ServerError::Protocol(e) if e.is_eof() => "eof",
            ServerError::Protocol(_) => "protocol",
            ServerError::Bind { .. } => "bind",
            ServerError::AlreadyRunning => "already_running",
            ServerError::NotRunning => "not_running",
            ServerError::ShuttingDown => "shutting_down",
            ServerError::Timeout => "timeout",
            ServerError::Config(_) => "config",
            ServerError::Metrics(_) => "metrics",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostdir_protocol::ProtocolError;

    #[test]
    fn test_kind_labels() {
        let eof = ServerError::from(ProtocolError::UnexpectedEof { field: "opcode" });
        assert_eq!(eof.kind(), "eof");

        let bad = ServerError::from(ProtocolError::InvalidLength {
            field: "username",
            len: 200,
            max: 127,
        });
        assert_eq!(bad.kind(), "protocol");
        assert_eq!(ServerError::Timeout.kind(), "timeout");
    }

    #[test]
    fn test_bind_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:25593".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("failed to bind 127.0.0.1:25593"));
    }
}
