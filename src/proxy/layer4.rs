//! Layer 4 (raw TCP) proxy
//!
//! Accepts client connections on the listen address and pipes bytes to and
//! from the target. Faults control it through [`TransportProxy`]: stopping
//! closes the listener and every live connection, and turning forwarding off
//! silently discards bytes in both directions while keeping sockets open.

use super::{ProxyError, TransportProxy};
use crate::config::ProxyConfig;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const BUFFER_SIZE: usize = 8192;

#[derive(Default)]
struct ListenerState {
    /// Present while the proxy is running
    token: Option<CancellationToken>,
    accept_task: Option<JoinHandle<()>>,
    /// Address of the first successful bind; restarts reuse it
    bound_addr: Option<SocketAddr>,
    /// Bumped on every start so a late rebind failure only clears its own start
    generation: u64,
}

pub struct Layer4Proxy {
    id: String,
    config: ProxyConfig,
    forwarding: Arc<AtomicBool>,
    state: Arc<Mutex<ListenerState>>,
}

impl Layer4Proxy {
    /// Construct an unstarted proxy; no sockets are touched until `start`
    pub fn new(id: impl Into<String>, config: ProxyConfig) -> Self {
        Layer4Proxy {
            id: id.into(),
            config,
            forwarding: Arc::new(AtomicBool::new(true)),
            state: Arc::new(Mutex::new(ListenerState::default())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Address clients should connect to, once the proxy has been started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().bound_addr
    }

    fn upstream(&self) -> Upstream {
        Upstream {
            id: self.id.clone(),
            target: self.config.target_addr(),
            forwarding: self.forwarding.clone(),
        }
    }
}

impl TransportProxy for Layer4Proxy {
    fn start(&self) -> Result<(), ProxyError> {
        let handle = Handle::try_current().map_err(|_| ProxyError::NoRuntime)?;
        let mut state = self.state.lock();
        if state.token.is_some() {
            return Ok(());
        }

        let token = CancellationToken::new();
        let previous = state.accept_task.take();
        let task = match (previous, state.bound_addr) {
            (Some(previous), Some(addr)) if !previous.is_finished() => {
                // The old listener is still closing; rebind once it has gone
                state.generation += 1;
                let rebind = Rebind {
                    addr,
                    generation: state.generation,
                    state: self.state.clone(),
                };
                handle.spawn(rebind_after(previous, rebind, self.upstream(), token.clone()))
            }
            _ => {
                let addr = match state.bound_addr {
                    Some(addr) => addr.to_string(),
                    None => self.config.listen_addr(),
                };
                let listener = bind(&addr)?;
                state.generation += 1;
                state.bound_addr = listener.local_addr().ok();
                handle.spawn(accept_loop(self.upstream(), listener, token.clone()))
            }
        };

        info!(
            proxy = %self.id,
            listen = ?state.bound_addr,
            upstream = %self.config.target_addr(),
            "Layer 4 proxy started"
        );
        state.token = Some(token);
        state.accept_task = Some(task);
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        if let Some(token) = state.token.take() {
            token.cancel();
            info!(proxy = %self.id, "Layer 4 proxy stopped");
        }
    }

    fn set_forwarding(&self, forwarding: bool) {
        let previous = self.forwarding.swap(forwarding, Ordering::SeqCst);
        if previous != forwarding {
            info!(proxy = %self.id, forwarding, "Layer 4 forwarding toggled");
        }
    }

    fn is_forwarding(&self) -> bool {
        self.forwarding.load(Ordering::SeqCst)
    }

    fn is_running(&self) -> bool {
        self.state.lock().token.is_some()
    }
}

impl Drop for Layer4Proxy {
    fn drop(&mut self) {
        if let Some(token) = self.state.lock().token.take() {
            token.cancel();
        }
    }
}

/// What every proxied connection needs to reach the backend
#[derive(Clone)]
struct Upstream {
    id: String,
    target: String,
    forwarding: Arc<AtomicBool>,
}

/// A start deferred until the previous listener has released its address
struct Rebind {
    addr: SocketAddr,
    generation: u64,
    state: Arc<Mutex<ListenerState>>,
}

async fn rebind_after(
    previous: JoinHandle<()>,
    rebind: Rebind,
    upstream: Upstream,
    token: CancellationToken,
) {
    let _ = previous.await;
    match TcpListener::bind(rebind.addr).await {
        Ok(listener) => accept_loop(upstream, listener, token).await,
        Err(e) => {
            error!(proxy = %upstream.id, "Failed to rebind {}: {}", rebind.addr, e);
            // Report stopped unless a later start has replaced this one
            let mut state = rebind.state.lock();
            if state.generation == rebind.generation {
                if let Some(token) = state.token.take() {
                    token.cancel();
                }
                state.accept_task = None;
            }
        }
    }
}

fn bind(addr: &str) -> Result<TcpListener, ProxyError> {
    let to_error = |source| ProxyError::Bind {
        addr: addr.to_string(),
        source,
    };
    let listener = std::net::TcpListener::bind(addr).map_err(to_error)?;
    listener.set_nonblocking(true).map_err(to_error)?;
    TcpListener::from_std(listener).map_err(to_error)
}

async fn accept_loop(upstream: Upstream, listener: TcpListener, token: CancellationToken) {
    let Upstream { id, target, forwarding } = upstream;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((inbound, peer)) => {
                    debug!(proxy = %id, %peer, "Accepted connection");
                    tokio::spawn(proxy_connection(
                        id.clone(),
                        inbound,
                        target.clone(),
                        forwarding.clone(),
                        token.child_token(),
                    ));
                }
                Err(e) => {
                    error!(proxy = %id, "Failed to accept connection: {}", e);
                }
            },
        }
    }
    debug!(proxy = %id, "Accept loop exited");
}

async fn proxy_connection(
    id: String,
    inbound: TcpStream,
    target: String,
    forwarding: Arc<AtomicBool>,
    token: CancellationToken,
) {
    let outbound = tokio::select! {
        _ = token.cancelled() => return,
        connected = TcpStream::connect(&target) => match connected {
            Ok(stream) => stream,
            Err(e) => {
                warn!(proxy = %id, addr = %target, "Failed to reach target: {}", e);
                return;
            }
        },
    };

    let (client_read, client_write) = inbound.into_split();
    let (server_read, server_write) = outbound.into_split();

    tokio::select! {
        _ = token.cancelled() => {
            debug!(proxy = %id, "Connection closed by proxy");
        }
        _ = async {
            tokio::join!(
                pump(client_read, server_write, forwarding.clone()),
                pump(server_read, client_write, forwarding.clone()),
            )
        } => {
            debug!(proxy = %id, "Connection finished");
        }
    }
}

/// Copy one direction, discarding bytes while forwarding is off
async fn pump(mut from: OwnedReadHalf, mut to: OwnedWriteHalf, forwarding: Arc<AtomicBool>) {
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        match from.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if !forwarding.load(Ordering::SeqCst) {
                    continue;
                }
                if to.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = to.shutdown().await;
}
