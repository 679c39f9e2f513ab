//! Reading requests and encoding responses.
//!
//! Requests are read field by field straight off the socket since each
//! connection carries a single request. Responses are encoded into a buffer
//! and written in one go.

use crate::error::ProtocolError;
use crate::message::{Opcode, Registration, Request, Response, StatusReply};
use crate::{MAX_PAYLOAD_FIELD, MAX_SHORT_FIELD};
use bytes::{BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

/// Maps a short read to [`ProtocolError::UnexpectedEof`] naming the field.
fn eof(field: &'static str) -> impl FnOnce(io::Error) -> ProtocolError {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ProtocolError::UnexpectedEof { field }
        } else {
            ProtocolError::Io(e)
        }
    }
}

/// Reads the opcode byte.
pub async fn read_opcode<R>(reader: &mut R) -> Result<Opcode, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let code = reader.read_u8().await.map_err(eof("opcode"))?;
    Ok(Opcode::from(code))
}

/// Reads the fields that follow `opcode`.
pub async fn read_fields<R>(reader: &mut R, opcode: Opcode) -> Result<Request, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    match opcode {
        Opcode::Count => Ok(Request::Count),
        Opcode::HostStatus => {
            let index = reader.read_i32().await.map_err(eof("index"))?;
            Ok(Request::HostStatus { index })
        }
        Opcode::Connect => {
            let index = reader.read_i32().await.map_err(eof("index"))?;
            let password = read_payload(reader, "password").await?;
            Ok(Request::Connect { index, password })
        }
        Opcode::Register => {
            let port = reader.read_i32().await.map_err(eof("port"))?;
            let username = read_string(reader, "username").await?;
            // Least significant half first.
            let least = reader.read_u64().await.map_err(eof("owner id"))?;
            let most = reader.read_u64().await.map_err(eof("owner id"))?;
            let address = read_string(reader, "address").await?;
            let digest = read_string(reader, "password digest").await?;

            let owner_id = Uuid::from_u128(((most as u128) << 64) | least as u128);
            Ok(Request::Register(
                Registration::new(username, address, port)
                    .with_owner_id(owner_id)
                    .with_password_digest(digest),
            ))
        }
        Opcode::Unknown(code) => Ok(Request::Unknown(code)),
    }
}

/// Reads a complete request: opcode, then its fields.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let opcode = read_opcode(reader).await?;
    read_fields(reader, opcode).await
}

/// Reads the response to a request with the given opcode.
///
/// A connection closed before any status bytes is an invalid index.
pub async fn read_response<R>(reader: &mut R, opcode: Opcode) -> Result<Response, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    match opcode {
        Opcode::Count => {
            let count = reader.read_u32().await.map_err(eof("count"))?;
            Ok(Response::Count(count))
        }
        Opcode::HostStatus => {
            let len = match reader.read_u16().await {
                Ok(len) => len as usize,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(Response::HostStatus(None))
                }
                Err(e) => return Err(ProtocolError::Io(e)),
            };
            if len == 0 {
                return Ok(Response::HostStatus(None));
            }
            let mut payload = vec![0u8; len];
            reader
                .read_exact(&mut payload)
                .await
                .map_err(eof("status payload"))?;
            let reply: StatusReply = serde_json::from_slice(&payload)?;
            Ok(Response::HostStatus(Some(reply)))
        }
        Opcode::Connect => {
            let approved = reader.read_u8().await.map_err(eof("approval"))? != 0;
            if approved {
                let endpoint = read_string(reader, "endpoint").await?;
                Ok(Response::Connect(Some(endpoint)))
            } else {
                Ok(Response::Connect(None))
            }
        }
        Opcode::Register => {
            let accepted = reader.read_u8().await.map_err(eof("result"))? != 0;
            Ok(Response::Registered(accepted))
        }
        Opcode::Unknown(_) => Ok(Response::Empty),
    }
}

/// Reads a field with a 1-byte length prefix.
async fn read_short<R>(reader: &mut R, field: &'static str) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u8().await.map_err(eof(field))? as usize;
    if len > MAX_SHORT_FIELD {
        return Err(ProtocolError::InvalidLength {
            field,
            len,
            max: MAX_SHORT_FIELD,
        });
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await.map_err(eof(field))?;
    Ok(data)
}

/// Reads a UTF-8 string with a 1-byte length prefix.
async fn read_string<R>(reader: &mut R, field: &'static str) -> Result<String, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let data = read_short(reader, field).await?;
    String::from_utf8(data).map_err(|_| ProtocolError::InvalidUtf8(field))
}

/// Reads a field with a 2-byte length prefix.
async fn read_payload<R>(reader: &mut R, field: &'static str) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u16().await.map_err(eof(field))? as usize;
    if len > MAX_PAYLOAD_FIELD {
        return Err(ProtocolError::InvalidLength {
            field,
            len,
            max: MAX_PAYLOAD_FIELD,
        });
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await.map_err(eof(field))?;
    Ok(data)
}

/// Encodes requests and responses.
pub struct Encoder;

impl Encoder {
    /// Encodes a response. Returns an empty buffer for responses with no bytes.
    pub fn encode_response(response: &Response) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::new();
        match response {
            Response::Count(count) => buf.put_u32(*count),
            Response::HostStatus(Some(reply)) => {
                let payload = serde_json::to_vec(reply)?;
                put_payload(&mut buf, &payload)?;
            }
            Response::HostStatus(None) => {}
            Response::Connect(Some(endpoint)) => {
                buf.put_u8(1);
                put_short(&mut buf, endpoint.as_bytes(), "endpoint")?;
            }
            Response::Connect(None) => buf.put_u8(0),
            Response::Registered(accepted) => buf.put_u8(u8::from(*accepted)),
            Response::Empty => {}
        }
        Ok(buf)
    }

    /// Encodes a request, opcode first.
    pub fn encode_request(request: &Request) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::new();
        buf.put_u8(request.opcode().code());
        match request {
            Request::Count | Request::Unknown(_) => {}
            Request::HostStatus { index } => buf.put_i32(*index),
            Request::Connect { index, password } => {
                buf.put_i32(*index);
                put_payload(&mut buf, password)?;
            }
            Request::Register(reg) => {
                buf.put_i32(reg.port);
                put_short(&mut buf, reg.username.as_bytes(), "username")?;
                let id = reg.owner_id.as_u128();
                buf.put_u64(id as u64);
                buf.put_u64((id >> 64) as u64);
                put_short(&mut buf, reg.address.as_bytes(), "address")?;
                let digest = reg.password_digest.as_deref().unwrap_or("");
                put_short(&mut buf, digest.as_bytes(), "password digest")?;
            }
        }
        Ok(buf)
    }
}

fn put_short(buf: &mut BytesMut, data: &[u8], field: &'static str) -> Result<(), ProtocolError> {
    if data.len() > MAX_SHORT_FIELD {
        return Err(ProtocolError::InvalidLength {
            field,
            len: data.len(),
            max: MAX_SHORT_FIELD,
        });
    }
    buf.put_u8(data.len() as u8);
    buf.put_slice(data);
    Ok(())
}

fn put_payload(buf: &mut BytesMut, data: &[u8]) -> Result<(), ProtocolError> {
    if data.len() > MAX_PAYLOAD_FIELD {
        return Err(ProtocolError::PayloadTooLarge {
            size: data.len(),
            max: MAX_PAYLOAD_FIELD,
        });
    }
    buf.put_u16(data.len() as u16);
    buf.put_slice(data);
    Ok(())
}
