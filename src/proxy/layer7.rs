//! Layer 7 interceptor host
//!
//! The WebSocket front end terminates the client's handshake, re-originates
//! it towards the backend, and hands every connection attempt and frame to
//! this proxy. The proxy only owns the interceptor slot, the wire codec, and
//! a running flag; it never buffers more than the frame it was given.

use super::{ApplicationProxy, InterceptorSlot, ProxyError};
use crate::protocol::{Action, ConnectionParams, Frame, FrameDirection, ProtocolCodec};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct Layer7Proxy {
    id: String,
    running: AtomicBool,
    interceptor: InterceptorSlot,
    codec: Arc<dyn ProtocolCodec>,
}

impl Layer7Proxy {
    pub fn new(id: impl Into<String>, codec: Arc<dyn ProtocolCodec>) -> Self {
        Layer7Proxy {
            id: id.into(),
            running: AtomicBool::new(false),
            interceptor: InterceptorSlot::new(),
            codec,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Entry point for each new client connection attempt
    pub fn intercept_connection(&self, params: ConnectionParams) -> ConnectionParams {
        let rewritten = self.interceptor.intercept_connection(params);
        debug!(proxy = %self.id, params = %rewritten, "Connection attempt");
        rewritten
    }

    /// Entry point for each frame observed in either direction
    pub fn intercept_frame(&self, direction: FrameDirection, frame: Frame) -> Vec<Action> {
        self.interceptor.intercept_frame(direction, frame)
    }
}

impl ApplicationProxy for Layer7Proxy {
    fn start(&self) -> Result<(), ProxyError> {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!(proxy = %self.id, "Layer 7 proxy started");
        }
        Ok(())
    }

    fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!(proxy = %self.id, "Layer 7 proxy stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn interceptor(&self) -> &InterceptorSlot {
        &self.interceptor
    }

    fn codec(&self) -> Arc<dyn ProtocolCodec> {
        self.codec.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::JsonCodec;

    #[test]
    fn test_lifecycle_is_idempotent() {
        let proxy = Layer7Proxy::new("l7", Arc::new(JsonCodec));
        assert!(!proxy.is_running());
        proxy.start().unwrap();
        proxy.start().unwrap();
        assert!(proxy.is_running());
        proxy.stop();
        proxy.stop();
        assert!(!proxy.is_running());
    }

    #[test]
    fn test_fresh_proxy_passes_frames() {
        let proxy = Layer7Proxy::new("l7", Arc::new(JsonCodec));
        let frame = Frame::binary(b"{}".to_vec());
        assert_eq!(
            proxy.intercept_frame(FrameDirection::ClientToServer, frame.clone()),
            Action::pass(FrameDirection::ClientToServer, frame)
        );
    }
}
