//! Session management.
//!
//! A session covers one connection, which carries exactly one request.

use hostdir_protocol::Opcode;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the opcode byte.
    AwaitOpcode,
    /// Waiting for the fields of the given opcode.
    AwaitFields(Opcode),
    /// Request decoded, being served.
    Execute(Opcode),
    /// Response being written.
    Respond(Opcode),
    /// Connection finished.
    Closed,
}

/// A client session.
#[derive(Debug)]
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    state: SessionState,

    created_at: Instant,
}

impl Session {
    /// Creates a new session.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            state: SessionState::AwaitOpcode,
            created_at: Instant::now(),
        }
    }

    /// Returns the session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the opcode being served, once known.
    pub fn opcode(&self) -> Option<Opcode> {
        match self.state {
            SessionState::AwaitFields(op)
            | SessionState::Execute(op)
            | SessionState::Respond(op) => Some(op),
            SessionState::AwaitOpcode | SessionState::Closed => None,
        }
    }

    /// Records the opcode byte.
    pub fn opcode_read(&mut self, opcode: Opcode) {
        debug_assert_eq!(self.state, SessionState::AwaitOpcode);
        self.state = SessionState::AwaitFields(opcode);
    }

    /// Records that the request fields were read.
    pub fn fields_read(&mut self) {
        if let SessionState::AwaitFields(op) = self.state {
            self.state = SessionState::Execute(op);
        }
    }

    /// Records that a response is being written.
    pub fn responding(&mut self) {
        if let SessionState::Execute(op) = self.state {
            self.state = SessionState::Respond(op);
        }
    }

    /// Marks the session closed. Valid from any state.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}
