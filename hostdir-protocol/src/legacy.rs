//! Legacy out-of-band status query.
//!
//! The probed game servers speak a line-oriented status protocol: the client
//! writes `0xFE 0x01`, the server answers with a single line whose fields are
//! separated by three NUL characters and then closes the connection. The
//! shape is dictated by the servers and must be kept byte-for-byte.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Query payload written after connecting.
pub const STATUS_QUERY: [u8; 2] = [0xFE, 0x01];

/// Separator between status fields.
pub const FIELD_SEPARATOR: &str = "\0\0\0";

/// Minimum number of fields in a valid status line.
pub const MIN_FIELDS: usize = 6;

/// Upper bound on the bytes read for one status line.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Fields extracted from a status line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LegacyStatus {
    pub protocol_version: String,
    pub motd: String,
    pub current_players: String,
    pub max_players: String,
}

/// Parses a status line. Returns `None` if it has fewer than six fields.
pub fn parse_status_line(line: &str) -> Option<LegacyStatus> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() < MIN_FIELDS {
        return None;
    }
    let clean = |s: &str| s.replace('\0', "");
    Some(LegacyStatus {
        protocol_version: clean(fields[2]),
        motd: clean(fields[3]),
        current_players: clean(fields[4]),
        max_players: clean(fields[5]),
    })
}

/// Reads one line, terminated by `\n`, `\r` or end of stream.
///
/// Returns `Ok(None)` if the stream ended before any byte arrived. Bytes are
/// decoded lossily as UTF-8.
pub async fn read_status_line<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if let Some(end) = chunk[..n].iter().position(|&b| b == b'\n' || b == b'\r') {
            line.extend_from_slice(&chunk[..end]);
            return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
        }
        line.extend_from_slice(&chunk[..n]);
        if line.len() >= MAX_LINE_BYTES {
            line.truncate(MAX_LINE_BYTES);
            break;
        }
    }
    if line.is_empty() {
        Ok(None)
    } else {
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_short_lines() {
        assert_eq!(parse_status_line(""), None);
        assert_eq!(parse_status_line("a\0\0\0b\0\0\0c"), None);
        assert_eq!(parse_status_line("a\0\0\0b\0\0\0c\0\0\0d\0\0\0e"), None);
    }

    #[test]
    fn test_parse_strips_nuls() {
        let line = "x\0\0\0\01\02\07\0\0\0\01\0.\04\0\0\0\0h\0i\0\0\0\03\0\0\0\02\00";
        let status = parse_status_line(line).unwrap();
        assert_eq!(status.protocol_version, "1.4");
        assert_eq!(status.motd, "hi");
        assert_eq!(status.current_players, "3");
        assert_eq!(status.max_players, "20");
    }

    #[tokio::test]
    async fn test_read_line_stops_at_terminator() {
        let mut input: &[u8] = b"first\nsecond";
        let line = read_status_line(&mut input).await.unwrap();
        assert_eq!(line.as_deref(), Some("first"));

        let mut input: &[u8] = b"carriage\rreturn";
        let line = read_status_line(&mut input).await.unwrap();
        assert_eq!(line.as_deref(), Some("carriage"));
    }

    #[tokio::test]
    async fn test_read_line_empty_stream() {
        let mut input: &[u8] = b"";
        assert_eq!(read_status_line(&mut input).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_line_caps_unterminated_input() {
        let data = vec![b'x'; MAX_LINE_BYTES + 4096];
        let mut input: &[u8] = &data;
        let line = read_status_line(&mut input).await.unwrap().unwrap();
        assert_eq!(line.len(), MAX_LINE_BYTES);
    }
}
