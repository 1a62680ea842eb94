//! End-to-end tests driving the proxy over loopback TCP

use connect_filter::{Blacklist, BlacklistReloader, BlacklistStore};
use connect_proxy::{ProxyServer, ProxyServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Instant};

const LIMIT: Duration = Duration::from_secs(5);

async fn start_proxy(store: Arc<BlacklistStore>, connect_timeout: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ProxyServer::new(ProxyServerConfig {
        listen_addr: addr.to_string(),
        store,
        connect_timeout,
        access_log: None,
    });
    tokio::spawn(async move { server.serve(listener).await });
    addr
}

/// Upstream that echoes everything back until the client closes
async fn start_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let (mut read, mut write) = stream.split();
                let _ = tokio::io::copy(&mut read, &mut write).await;
            });
        }
    });
    addr
}

/// Send a CONNECT and read the response head without consuming tunnel bytes
async fn connect(proxy: SocketAddr, target: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = timeout(LIMIT, stream.read(&mut byte)).await.unwrap().unwrap();
        assert_ne!(n, 0, "connection closed before response head");
        head.push(byte[0]);
    }
    (stream, String::from_utf8(head).unwrap())
}

fn status_of(head: &str) -> u16 {
    head.split_whitespace().nth(1).unwrap().parse().unwrap()
}

async fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut rest = Vec::new();
    timeout(LIMIT, stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    rest
}

#[tokio::test]
async fn test_tunnel_relays_bytes() {
    let echo = start_echo().await;
    let proxy = start_proxy(Arc::default(), Duration::from_secs(10)).await;

    let (mut stream, head) = connect(proxy, &echo.to_string()).await;
    assert_eq!(status_of(&head), 200);

    stream.write_all(b"hello through the tunnel").await.unwrap();
    let mut buf = [0u8; 24];
    timeout(LIMIT, stream.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"hello through the tunnel");
}

#[tokio::test]
async fn test_blacklisted_destination_is_refused() {
    let echo = start_echo().await;
    let store = Arc::new(BlacklistStore::new(Blacklist::parse("127.0.0.1")));
    let proxy = start_proxy(store, Duration::from_secs(10)).await;

    let (mut stream, head) = connect(proxy, &echo.to_string()).await;
    assert_eq!(status_of(&head), 403);

    // The proxy closes the connection after the rejection body
    let body = read_to_close(&mut stream).await;
    assert!(String::from_utf8_lossy(&body).contains("blocked"));
}

#[tokio::test]
async fn test_refused_dial_is_service_unavailable() {
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let proxy = start_proxy(Arc::default(), Duration::from_secs(10)).await;

    let (_stream, head) = connect(proxy, &closed.to_string()).await;
    assert_eq!(status_of(&head), 503);
}

#[tokio::test]
async fn test_unconnectable_dial_is_bounded_by_timeout() {
    let connect_timeout = Duration::from_millis(300);
    let proxy = start_proxy(Arc::default(), connect_timeout).await;

    // Port 0 can never be connected to
    let started = Instant::now();
    let (_stream, head) = connect(proxy, "127.0.0.1:0").await;
    assert_eq!(status_of(&head), 503);
    assert!(started.elapsed() < connect_timeout + Duration::from_secs(2));
}

#[tokio::test]
async fn test_portless_target_is_service_unavailable() {
    let proxy = start_proxy(Arc::default(), Duration::from_secs(10)).await;

    let (_stream, head) = connect(proxy, "localhost").await;
    assert_eq!(status_of(&head), 503);
}

#[tokio::test]
async fn test_portless_blacklisted_target_is_refused() {
    let store = Arc::new(BlacklistStore::new(Blacklist::parse("evil.com")));
    let proxy = start_proxy(store, Duration::from_secs(10)).await;

    let (_stream, head) = connect(proxy, "evil.com").await;
    assert_eq!(status_of(&head), 403);
}

#[tokio::test]
async fn test_upstream_close_closes_client() {
    // Upstream sends a greeting and hangs up
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"bye").await.unwrap();
    });

    let proxy = start_proxy(Arc::default(), Duration::from_secs(10)).await;
    let (mut stream, head) = connect(proxy, &upstream.to_string()).await;
    assert_eq!(status_of(&head), 200);

    assert_eq!(read_to_close(&mut stream).await, b"bye");
}

#[tokio::test]
async fn test_client_close_closes_upstream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let _ = stream.read_to_end(&mut received).await;
        let _ = seen_tx.send(received);
    });

    let proxy = start_proxy(Arc::default(), Duration::from_secs(10)).await;
    let (mut stream, head) = connect(proxy, &upstream.to_string()).await;
    assert_eq!(status_of(&head), 200);

    stream.write_all(b"last words").await.unwrap();
    drop(stream);

    let received = timeout(LIMIT, seen_rx).await.unwrap().unwrap();
    assert_eq!(received, b"last words");
}

#[tokio::test]
async fn test_non_connect_request_is_refused() {
    let proxy = start_proxy(Arc::default(), Duration::from_secs(10)).await;

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream
        .write_all(b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let response = read_to_close(&mut stream).await;
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 405"));
}

#[tokio::test]
async fn test_reload_takes_effect_for_new_requests() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("blacklist.txt");
    std::fs::write(&path, "\n").unwrap();

    let echo = start_echo().await;
    let store = Arc::new(BlacklistStore::default());
    let reload = BlacklistReloader::new(&path, Duration::from_millis(20), Arc::clone(&store)).spawn();
    let proxy = start_proxy(Arc::clone(&store), Duration::from_secs(10)).await;

    // Established before the swap: keeps working afterwards
    let (mut early, head) = connect(proxy, &echo.to_string()).await;
    assert_eq!(status_of(&head), 200);

    std::fs::write(&path, "*.*\n").unwrap();
    let deadline = Instant::now() + LIMIT;
    while !store.is_blocked("anything:1") {
        assert!(Instant::now() < deadline, "reload not observed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (_late, head) = connect(proxy, &echo.to_string()).await;
    assert_eq!(status_of(&head), 403);

    early.write_all(b"still open").await.unwrap();
    let mut buf = [0u8; 10];
    timeout(LIMIT, early.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"still open");

    reload.abort();
}
