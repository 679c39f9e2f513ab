//! # hostdir-protocol
//!
//! Wire protocol implementation for hostdir.
//!
//! This crate provides:
//! - The opcode table and typed requests/responses
//! - An async request reader with explicit length-prefix validation
//! - Response and request encoders
//! - The legacy out-of-band status query used to probe game servers

pub mod codec;
pub mod error;
pub mod legacy;
pub mod message;

pub use codec::{read_request, read_response, Encoder};
pub use error::ProtocolError;
pub use legacy::{parse_status_line, LegacyStatus, STATUS_QUERY};
pub use message::{Opcode, Registration, Request, Response, StatusReply};

/// Default port for the directory service.
pub const DEFAULT_PORT: u16 = 25593;

/// Largest value a 1-byte length prefix may carry (signed in legacy clients).
pub const MAX_SHORT_FIELD: usize = i8::MAX as usize;

/// Largest value a 2-byte length prefix may carry (signed in legacy clients).
pub const MAX_PAYLOAD_FIELD: usize = i16::MAX as usize;
