//! Test helpers: an in-process game server answering the legacy status query.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A fake game server on `127.0.0.1`.
///
/// While online it answers every status query; while offline it accepts and
/// immediately closes connections, which probes report as unreachable.
pub struct FakeGameServer {
    addr: SocketAddr,
    online: Arc<AtomicBool>,
    probes: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeGameServer {
    /// Starts an online server advertising `motd`, protocol `1.4.2`, 3/20 players.
    pub async fn start(motd: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake game server");
        let addr = listener.local_addr().expect("local addr");
        let online = Arc::new(AtomicBool::new(true));
        let probes = Arc::new(AtomicUsize::new(0));
        let response = encode_status_response("127", "1.4.2", motd, "3", "20");

        let task = {
            let online = online.clone();
            let probes = probes.clone();
            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    if !online.load(Ordering::SeqCst) {
                        continue;
                    }
                    probes.fetch_add(1, Ordering::SeqCst);
                    let response = response.clone();
                    tokio::spawn(async move {
                        let mut query = [0u8; 2];
                        if stream.read_exact(&mut query).await.is_ok() {
                            let _ = stream.write_all(&response).await;
                        }
                    });
                }
            })
        };

        Self {
            addr,
            online,
            probes,
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Switches between answering and dropping status queries.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of status queries answered so far.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl Drop for FakeGameServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Returns a local port with nothing listening on it.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

/// Builds the reply a legacy game server sends to the status query.
///
/// A kick packet (`0xFF`), the UTF-16 length, then the UTF-16BE text
/// `§1\0<protocol>\0<version>\0<motd>\0<current>\0<max>`.
pub fn encode_status_response(
    protocol: &str,
    version: &str,
    motd: &str,
    current_players: &str,
    max_players: &str,
) -> Vec<u8> {
    let text = format!(
        "\u{a7}1\0{}\0{}\0{}\0{}\0{}",
        protocol, version, motd, current_players, max_players
    );
    let units: Vec<u16> = text.encode_utf16().collect();
    let len = u16::try_from(units.len()).expect("status text longer than 65535 units");
    let mut out = Vec::with_capacity(3 + units.len() * 2);
    out.push(0xFF);
    out.extend_from_slice(&len.to_be_bytes());
    for unit in units {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostdir_protocol::legacy::{parse_status_line, read_status_line, LegacyStatus};

    #[tokio::test]
    async fn test_status_response_parses() {
        let bytes = encode_status_response("127", "1.4.2", "A Minecraft Server", "3", "20");
        let mut input: &[u8] = &bytes;
        let line = read_status_line(&mut input).await.unwrap().unwrap();
        assert_eq!(
            parse_status_line(&line),
            Some(LegacyStatus {
                protocol_version: "1.4.2".to_string(),
                motd: "A Minecraft Server".to_string(),
                current_players: "3".to_string(),
                max_players: "20".to_string(),
            })
        );
    }
}
