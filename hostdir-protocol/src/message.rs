//! Typed requests and responses for the directory protocol.
//!
//! Every connection carries exactly one request: an opcode byte followed by
//! the opcode's fields. Multi-byte integers are big-endian.
//!
//! | Opcode | Request fields | Response |
//! |---|---|---|
//! | 0 | none | `u32` host count |
//! | 1 | `i32` index | `u16`-prefixed JSON [`StatusReply`], nothing for a bad index |
//! | 2 | `i32` index, `u16`-prefixed password | `bool`, then `u8`-prefixed `address:port` if true |
//! | 20 | `i32` port, `u8` username, 16-byte owner id, `u8` address, `u8` digest | `bool` |

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Number of registered hosts.
    Count,
    /// Public status of the host at an index.
    HostStatus,
    /// Trade an index and password for the host's endpoint.
    Connect,
    /// Register a new host.
    Register,
    /// Anything else; served as a no-op.
    Unknown(u8),
}

impl Opcode {
    pub const COUNT: u8 = 0;
    pub const HOST_STATUS: u8 = 1;
    pub const CONNECT: u8 = 2;
    pub const REGISTER: u8 = 20;

    /// Returns the wire byte for this opcode.
    pub fn code(self) -> u8 {
        match self {
            Opcode::Count => Self::COUNT,
            Opcode::HostStatus => Self::HOST_STATUS,
            Opcode::Connect => Self::CONNECT,
            Opcode::Register => Self::REGISTER,
            Opcode::Unknown(code) => code,
        }
    }

    /// Returns a stable label, used for logs and metrics.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Count => "count",
            Opcode::HostStatus => "host_status",
            Opcode::Connect => "connect",
            Opcode::Register => "register",
            Opcode::Unknown(_) => "unknown",
        }
    }
}

impl From<u8> for Opcode {
    fn from(code: u8) -> Self {
        match code {
            Self::COUNT => Opcode::Count,
            Self::HOST_STATUS => Opcode::HostStatus,
            Self::CONNECT => Opcode::Connect,
            Self::REGISTER => Opcode::Register,
            other => Opcode::Unknown(other),
        }
    }
}

/// A host registration as submitted by opcode 20.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Port as sent on the wire; range is checked at admission.
    pub port: i32,
    /// Display username; compared case-insensitively.
    pub username: String,
    /// Opaque owner identifier.
    pub owner_id: Uuid,
    /// Address clients should connect to.
    pub address: String,
    /// Hex password digest. `None` when the client sent an empty field.
    pub password_digest: Option<String>,
}

impl Registration {
    pub fn new(username: impl Into<String>, address: impl Into<String>, port: i32) -> Self {
        Self {
            port,
            username: username.into(),
            owner_id: Uuid::nil(),
            address: address.into(),
            password_digest: None,
        }
    }

    pub fn with_owner_id(mut self, owner_id: Uuid) -> Self {
        self.owner_id = owner_id;
        self
    }

    /// Sets the password digest, normalising an empty digest to none.
    pub fn with_password_digest(mut self, digest: impl Into<String>) -> Self {
        let digest = digest.into();
        self.password_digest = if digest.is_empty() { None } else { Some(digest) };
        self
    }
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Count,
    HostStatus { index: i32 },
    Connect { index: i32, password: Vec<u8> },
    Register(Registration),
    Unknown(u8),
}

impl Request {
    /// Returns the opcode of this request.
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Count => Opcode::Count,
            Request::HostStatus { .. } => Opcode::HostStatus,
            Request::Connect { .. } => Opcode::Connect,
            Request::Register(_) => Opcode::Register,
            Request::Unknown(code) => Opcode::Unknown(*code),
        }
    }
}

/// Public status of a host, returned by opcode 1.
///
/// Field names and order are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    /// 1 if the host is password protected.
    #[serde(rename = "p")]
    pub password: u8,
    /// Owner username in its registered casing.
    #[serde(rename = "o")]
    pub owner: String,
    /// Owner identifier.
    #[serde(rename = "u")]
    pub owner_id: Uuid,
    /// Protocol version string reported by the game server.
    #[serde(rename = "v")]
    pub version: String,
    /// Base64 of the motd.
    #[serde(rename = "m")]
    pub motd: String,
    /// `current/max` players.
    #[serde(rename = "l")]
    pub players: String,
}

impl StatusReply {
    pub fn new(
        owner: impl Into<String>,
        owner_id: Uuid,
        has_password: bool,
        version: impl Into<String>,
        motd: &str,
        current_players: &str,
        max_players: &str,
    ) -> Self {
        Self {
            password: u8::from(has_password),
            owner: owner.into(),
            owner_id,
            version: version.into(),
            motd: STANDARD.encode(motd.as_bytes()),
            players: format!("{}/{}", current_players, max_players),
        }
    }

    /// Returns whether the host is password protected.
    pub fn has_password(&self) -> bool {
        self.password != 0
    }

    /// Decodes the motd, if it is valid base64 and UTF-8.
    pub fn motd_text(&self) -> Option<String> {
        let bytes = STANDARD.decode(&self.motd).ok()?;
        String::from_utf8(bytes).ok()
    }
}

/// A response to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Count(u32),
    /// `None` when the index did not resolve to a host.
    HostStatus(Option<StatusReply>),
    /// The `address:port` endpoint on success.
    Connect(Option<String>),
    Registered(bool),
    /// Unknown opcodes get no response bytes.
    Empty,
}
