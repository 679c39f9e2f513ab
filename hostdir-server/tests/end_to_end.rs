//! Drives a running service over TCP against in-process game servers.

use hostdir_core::password;
use hostdir_core::testing::FakeGameServer;
use hostdir_protocol::{read_response, Encoder, Registration, Request, Response};
use hostdir_server::{Config, DirectoryService, ServerError};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

fn test_config() -> Config {
    let mut config = Config::default();
    config.network.bind_addr = "127.0.0.1:0".parse().unwrap();
    config.probe.refresh_timeout_ms = 500;
    config.probe.vetting_timeout_ms = 500;
    config.sweep.enabled = false;
    config
}

async fn call(addr: SocketAddr, request: Request) -> Response {
    let opcode = request.opcode();
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let bytes = Encoder::encode_request(&request).unwrap();
    stream.write_all(&bytes).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), read_response(&mut stream, opcode))
        .await
        .expect("response timed out")
        .unwrap()
}

async fn register(addr: SocketAddr, registration: Registration) -> bool {
    match call(addr, Request::Register(registration)).await {
        Response::Registered(accepted) => accepted,
        other => panic!("unexpected response {:?}", other),
    }
}

async fn count(addr: SocketAddr) -> u32 {
    match call(addr, Request::Count).await {
        Response::Count(n) => n,
        other => panic!("unexpected response {:?}", other),
    }
}

#[tokio::test]
async fn test_register_count_status_connect() {
    let game = FakeGameServer::start("A Minecraft Server").await;
    let service = DirectoryService::with_config(test_config());
    let addr = service.start(0).await.unwrap();
    let owner = Uuid::new_v4();

    let alice = Registration::new("Alice", "127.0.0.1", game.port() as i32).with_owner_id(owner);
    assert!(register(addr, alice).await);
    assert_eq!(count(addr).await, 1);

    let Response::HostStatus(Some(reply)) = call(addr, Request::HostStatus { index: 0 }).await
    else {
        panic!("expected a status reply");
    };
    assert_eq!(reply.owner, "Alice");
    assert_eq!(reply.owner_id, owner);
    assert!(!reply.has_password());
    assert_eq!(reply.version, "1.4.2");
    assert_eq!(reply.motd_text().as_deref(), Some("A Minecraft Server"));
    assert_eq!(reply.players, "3/20");

    let response = call(
        addr,
        Request::Connect {
            index: 0,
            password: vec![],
        },
    )
    .await;
    assert_eq!(
        response,
        Response::Connect(Some(format!("127.0.0.1:{}", game.port())))
    );

    // Out of range indices.
    assert_eq!(
        call(addr, Request::HostStatus { index: 1 }).await,
        Response::HostStatus(None)
    );
    assert_eq!(
        call(
            addr,
            Request::Connect {
                index: 5,
                password: vec![]
            }
        )
        .await,
        Response::Connect(None)
    );

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_password_gates_endpoint() {
    let game = FakeGameServer::start("locked").await;
    let service = DirectoryService::with_config(test_config());
    let addr = service.start(0).await.unwrap();

    let reg = Registration::new("Bob", "127.0.0.1", game.port() as i32)
        .with_password_digest(password::digest(b"opensesame"));
    assert!(register(addr, reg).await);

    let connect = |password: &[u8]| Request::Connect {
        index: 0,
        password: password.to_vec(),
    };
    assert_eq!(call(addr, connect(b"")).await, Response::Connect(None));
    assert_eq!(call(addr, connect(b"guess")).await, Response::Connect(None));
    assert_eq!(
        call(addr, connect(b"opensesame")).await,
        Response::Connect(Some(format!("127.0.0.1:{}", game.port())))
    );

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_registrations() {
    let first = FakeGameServer::start("first").await;
    let second = FakeGameServer::start("second").await;
    let service = DirectoryService::with_config(test_config());
    let addr = service.start(0).await.unwrap();

    assert!(register(addr, Registration::new("Alice", "127.0.0.1", first.port() as i32)).await);

    // Same endpoint under another name.
    assert!(!register(addr, Registration::new("Mallory", "127.0.0.1", first.port() as i32)).await);
    // Same name, any casing, while the first host answers.
    assert!(!register(addr, Registration::new("ALICE", "127.0.0.1", second.port() as i32)).await);
    assert_eq!(count(addr).await, 1);

    // Once the first host goes quiet its name can be taken over.
    first.set_online(false);
    assert!(register(addr, Registration::new("alice", "127.0.0.1", second.port() as i32)).await);
    assert_eq!(count(addr).await, 1);
    let host = service.registry().await.unwrap().lookup("Alice").unwrap();
    assert_eq!(host.username(), "alice");
    assert_eq!(host.port(), second.port());

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_registration_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let service = DirectoryService::with_config(test_config());
    let addr = service.start(0).await.unwrap();

    assert!(!register(addr, Registration::new("Ghost", "127.0.0.1", port as i32)).await);
    assert_eq!(count(addr).await, 0);

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_slow_probe_does_not_block_other_clients() {
    // Accepts connections but never answers status queries.
    let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let silent_port = silent.local_addr().unwrap().port();

    let mut config = test_config();
    config.probe.vetting_timeout_ms = 1500;
    let service = DirectoryService::with_config(config);
    let addr = service.start(0).await.unwrap();

    let pending = tokio::spawn(register(
        addr,
        Registration::new("Slow", "127.0.0.1", silent_port as i32),
    ));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    for _ in 0..10 {
        assert_eq!(count(addr).await, 0);
    }
    assert!(started.elapsed() < Duration::from_millis(1000));

    assert!(!pending.await.unwrap());
    service.stop().await.unwrap();
    drop(silent);
}

#[tokio::test]
async fn test_sweeper_evicts_dead_hosts() {
    let stays = FakeGameServer::start("stays").await;
    let leaves = FakeGameServer::start("leaves").await;

    let mut config = test_config();
    config.sweep.enabled = true;
    config.sweep.initial_delay_secs = 1;
    config.sweep.interval_secs = 1;
    let service = DirectoryService::with_config(config);
    let addr = service.start(0).await.unwrap();

    assert!(register(addr, Registration::new("Stays", "127.0.0.1", stays.port() as i32)).await);
    assert!(register(addr, Registration::new("Leaves", "127.0.0.1", leaves.port() as i32)).await);
    leaves.set_online(false);

    let deadline = Instant::now() + Duration::from_secs(6);
    while count(addr).await > 1 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    assert_eq!(count(addr).await, 1);
    let registry = service.registry().await.unwrap();
    assert!(registry.lookup("stays").is_some());
    assert!(registry.lookup("leaves").is_none());

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_errors() {
    let service = DirectoryService::with_config(test_config());
    assert!(matches!(service.stop().await, Err(ServerError::NotRunning)));

    service.start(0).await.unwrap();
    assert!(matches!(
        service.start(0).await,
        Err(ServerError::AlreadyRunning)
    ));
    service.stop().await.unwrap();
    assert!(matches!(service.stop().await, Err(ServerError::NotRunning)));
}
