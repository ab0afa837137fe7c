//! Proxy Handles
//!
//! Faults break a connection through one of two proxies placed between the
//! client under test and the real backend:
//!
//! ```text
//! ┌────────┐     ┌──────────────────────────┐     ┌─────────┐
//! │ client │────▶│ Layer4Proxy (raw TCP)     │────▶│ backend │
//! └────────┘     │   or                      │     └─────────┘
//!                │ Layer7Proxy (interceptor) │
//!                └──────────────────────────┘
//! ```
//!
//! The traits here are the handles a fault simulation owns; the concrete
//! proxies are built per simulation by a [`ProxyFactory`].

pub mod interceptor;
pub mod layer4;
pub mod layer7;

pub use interceptor::{Interceptor, InterceptorSlot, PassThroughInterceptor};
pub use layer4::Layer4Proxy;
pub use layer7::Layer7Proxy;

use crate::config::ProxyConfig;
use crate::protocol::{JsonCodec, ProtocolCodec};
use std::sync::Arc;

/// Error returned when a proxy cannot change state
#[derive(Debug)]
pub enum ProxyError {
    /// Listener could not bind its address
    Bind { addr: String, source: std::io::Error },
    /// Starting requires a tokio runtime on the calling thread
    NoRuntime,
}

impl std::fmt::Display for ProxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyError::Bind { addr, source } => {
                write!(f, "Failed to bind proxy listener on {}: {}", addr, source)
            }
            ProxyError::NoRuntime => write!(f, "Proxy start requires a tokio runtime"),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Bind { source, .. } => Some(source),
            ProxyError::NoRuntime => None,
        }
    }
}

/// Raw connection accept/forward control
pub trait TransportProxy: Send + Sync {
    /// Start accepting connections. Idempotent.
    fn start(&self) -> Result<(), ProxyError>;

    /// Stop accepting and close every live connection. Idempotent.
    fn stop(&self);

    /// While off, live connections stay open but nothing is forwarded
    fn set_forwarding(&self, forwarding: bool);

    fn is_forwarding(&self) -> bool;

    fn is_running(&self) -> bool;
}

/// Protocol-aware proxy with a pluggable per-connection interceptor
pub trait ApplicationProxy: Send + Sync {
    fn start(&self) -> Result<(), ProxyError>;

    fn stop(&self);

    fn is_running(&self) -> bool;

    fn interceptor(&self) -> &InterceptorSlot;

    /// Codec for the wire format this proxy's connections speak
    fn codec(&self) -> Arc<dyn ProtocolCodec>;
}

/// The proxy owned by a fault simulation
#[derive(Clone)]
pub enum ProxyHandle {
    Transport(Arc<dyn TransportProxy>),
    Application(Arc<dyn ApplicationProxy>),
}

impl ProxyHandle {
    pub fn start(&self) -> Result<(), ProxyError> {
        match self {
            ProxyHandle::Transport(proxy) => proxy.start(),
            ProxyHandle::Application(proxy) => proxy.start(),
        }
    }

    pub fn stop(&self) {
        match self {
            ProxyHandle::Transport(proxy) => proxy.stop(),
            ProxyHandle::Application(proxy) => proxy.stop(),
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            ProxyHandle::Transport(proxy) => proxy.is_running(),
            ProxyHandle::Application(proxy) => proxy.is_running(),
        }
    }
}

/// Builds a fresh, unstarted proxy for each simulation
pub trait ProxyFactory: Send + Sync {
    fn transport_proxy(&self, id: &str) -> Arc<dyn TransportProxy>;

    fn application_proxy(&self, id: &str) -> Arc<dyn ApplicationProxy>;
}

/// Builds [`Layer4Proxy`] and [`Layer7Proxy`] instances from configuration
pub struct DefaultProxyFactory {
    config: ProxyConfig,
    codec: Arc<dyn ProtocolCodec>,
}

impl DefaultProxyFactory {
    pub fn new(config: ProxyConfig) -> Self {
        DefaultProxyFactory {
            config,
            codec: Arc::new(JsonCodec),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn ProtocolCodec>) -> Self {
        self.codec = codec;
        self
    }
}

impl ProxyFactory for DefaultProxyFactory {
    fn transport_proxy(&self, id: &str) -> Arc<dyn TransportProxy> {
        Arc::new(Layer4Proxy::new(id, self.config.clone()))
    }

    fn application_proxy(&self, id: &str) -> Arc<dyn ApplicationProxy> {
        Arc::new(Layer7Proxy::new(id, self.codec.clone()))
    }
}
