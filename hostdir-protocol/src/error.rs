//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur while reading or writing a request.
///
/// All of these are scoped to a single connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed while reading {field}")]
    UnexpectedEof { field: &'static str },

    #[error("invalid length prefix for {field}: {len} (max {max})")]
    InvalidLength {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns whether the peer simply hung up mid-request.
    pub fn is_eof(&self) -> bool {
        matches!(self, ProtocolError::UnexpectedEof { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnexpectedEof { field: "opcode" };
        assert!(err.to_string().contains("opcode"));
        assert!(err.is_eof());

        let err = ProtocolError::InvalidLength {
            field: "username",
            len: 200,
            max: 127,
        };
        let msg = err.to_string();
        assert!(msg.contains("username"));
        assert!(msg.contains("200"));
        assert!(!err.is_eof());

        let err = ProtocolError::InvalidUtf8("address");
        assert!(err.to_string().contains("UTF-8"));

        let err = ProtocolError::PayloadTooLarge {
            size: 70000,
            max: 32767,
        };
        assert!(err.to_string().contains("70000"));
    }
}
