//! Transport faults against a real Layer 4 proxy on loopback TCP

use realtime_faults::faults::{
    DisconnectAndSuspend, NullTransportFault, TcpConnectionRefused, TcpConnectionUnresponsive,
};
use realtime_faults::{FaultSimulation, Layer4Proxy, ProxyConfig, TransportProxy};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Loopback server that echoes every byte back
async fn echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let (mut read, mut write) = socket.split();
                let _ = tokio::io::copy(&mut read, &mut write).await;
            });
        }
    });
    addr
}

async fn proxy_to_echo(id: &str) -> Arc<Layer4Proxy> {
    let upstream = echo_server().await;
    let config = ProxyConfig::default()
        .with_listen_port(0)
        .with_target(upstream.ip().to_string(), upstream.port());
    Arc::new(Layer4Proxy::new(id, config))
}

async fn round_trip(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<Vec<u8>> {
    stream.write_all(payload).await?;
    let mut buf = vec![0u8; payload.len()];
    timeout(IO_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "no echo"))??;
    Ok(buf)
}

/// Retry until a fresh connection through the proxy echoes
async fn wait_for_echo(addr: SocketAddr) -> TcpStream {
    for _ in 0..100 {
        if let Ok(mut stream) = TcpStream::connect(addr).await {
            if let Ok(echoed) = round_trip(&mut stream, b"ping").await {
                assert_eq!(echoed, b"ping");
                return stream;
            }
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("proxy at {} never came back", addr);
}

/// Retry until the proxy stops accepting connections
async fn wait_for_refused(addr: SocketAddr) {
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_err() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("proxy at {} still accepting", addr);
}

#[tokio::test]
async fn test_null_fault_proxies_traffic() {
    let proxy = proxy_to_echo("null").await;
    let fault = NullTransportFault::new("null", proxy.clone());
    proxy.start().unwrap();
    fault.enable().unwrap();

    let addr = proxy.local_addr().unwrap();
    let mut stream = wait_for_echo(addr).await;
    assert_eq!(round_trip(&mut stream, b"hello").await.unwrap(), b"hello");

    fault.resolve().unwrap();
    fault.clean_up();
    assert!(!proxy.is_running());
}

#[tokio::test]
async fn test_connection_refused_then_resolved() {
    let proxy = proxy_to_echo("refused").await;
    let fault = TcpConnectionRefused::new("refused", proxy.clone());
    proxy.start().unwrap();
    let addr = proxy.local_addr().unwrap();
    wait_for_echo(addr).await;

    fault.enable().unwrap();
    wait_for_refused(addr).await;

    fault.resolve().unwrap();
    assert_eq!(proxy.local_addr(), Some(addr));
    let mut stream = wait_for_echo(addr).await;
    assert_eq!(round_trip(&mut stream, b"back").await.unwrap(), b"back");

    fault.clean_up();
    fault.clean_up();
}

#[tokio::test]
async fn test_connection_unresponsive_holds_socket_open() {
    let proxy = proxy_to_echo("unresponsive").await;
    let fault = TcpConnectionUnresponsive::new("unresponsive", proxy.clone());
    proxy.start().unwrap();
    let addr = proxy.local_addr().unwrap();
    let mut stream = wait_for_echo(addr).await;

    fault.enable().unwrap();
    stream.write_all(b"lost").await.unwrap();
    let mut buf = [0u8; 4];
    let silent = timeout(Duration::from_millis(300), stream.read(&mut buf)).await;
    assert!(silent.is_err(), "no bytes should come back while unresponsive");

    fault.resolve().unwrap();
    assert_eq!(round_trip(&mut stream, b"okay").await.unwrap(), b"okay");
    fault.clean_up();
}

#[tokio::test]
async fn test_disconnect_and_suspend_restarts_itself() {
    let proxy = proxy_to_echo("suspend").await;
    let fault = DisconnectAndSuspend::with_delay("suspend", proxy.clone(), Duration::from_millis(300));
    proxy.start().unwrap();
    let addr = proxy.local_addr().unwrap();
    let mut existing = wait_for_echo(addr).await;

    fault.enable().unwrap();
    assert!(fault.restart_pending());
    wait_for_refused(addr).await;

    // Live connections are torn down too
    let mut buf = [0u8; 1];
    let closed = timeout(IO_TIMEOUT, existing.read(&mut buf)).await.unwrap();
    assert!(matches!(closed, Ok(0) | Err(_)));

    // Comes back online without resolve()
    wait_for_echo(addr).await;
    assert!(!fault.restart_pending());
    assert!(proxy.is_running());

    fault.clean_up();
    assert!(!proxy.is_running());
}

#[tokio::test]
async fn test_disconnect_and_suspend_clean_up_cancels_restart() {
    let proxy = proxy_to_echo("suspend-cleanup").await;
    let fault = DisconnectAndSuspend::with_delay("suspend-cleanup", proxy.clone(), Duration::from_millis(100));
    proxy.start().unwrap();
    let addr = proxy.local_addr().unwrap();

    fault.enable().unwrap();
    fault.clean_up();
    sleep(Duration::from_millis(400)).await;
    assert!(!proxy.is_running());
    wait_for_refused(addr).await;
}
