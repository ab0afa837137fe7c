//! Application-layer fault plumbing
//!
//! Every application-layer fault is an [`ApplicationFault`] wrapping a
//! [`FaultInterceptor`]: the interceptor owns the fault's private state behind
//! a mutex, and the wrapper swaps it in and out of the proxy's slot.

use super::{catalog, FaultError, FaultSimulation, FaultType};
use crate::protocol::{Action, ConnectionParams, Frame, FrameDirection, Message, ProtocolCodec};
use crate::proxy::{ApplicationProxy, Interceptor, ProxyHandle};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// An interceptor with resettable per-fault state
pub trait FaultInterceptor: Interceptor + 'static {
    /// Return to the initial state of the fault's cycle
    fn reset(&self);
}

/// What every interceptor needs from its simulation: identity for logs,
/// the codec to classify frames, and a way back to the slot to self-resolve.
pub struct ApplicationLayer {
    pub id: String,
    pub name: &'static str,
    proxy: Weak<dyn ApplicationProxy>,
    codec: Arc<dyn ProtocolCodec>,
}

impl ApplicationLayer {
    pub fn new(id: &str, name: &'static str, proxy: &Arc<dyn ApplicationProxy>) -> Self {
        ApplicationLayer {
            id: id.to_string(),
            name,
            proxy: Arc::downgrade(proxy),
            codec: proxy.codec(),
        }
    }

    /// Decode a binary frame. Anything else, or an undecodable payload, is
    /// "not matched" and must be passed through by the caller.
    pub fn decode(&self, frame: &Frame) -> Option<Message> {
        let payload = frame.binary_payload()?;
        match self.codec.decode(payload) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(fault = self.name, id = %self.id, "Undecodable frame passed through: {}", e);
                None
            }
        }
    }

    /// Decode a binary frame travelling in `direction`
    pub fn decode_in(&self, direction: FrameDirection, expected: FrameDirection, frame: &Frame) -> Option<Message> {
        if direction != expected {
            return None;
        }
        self.decode(frame)
    }

    pub fn encode(&self, message: &Message) -> Option<Frame> {
        match self.codec.encode(message) {
            Ok(bytes) => Some(Frame::Binary(bytes)),
            Err(e) => {
                warn!(fault = self.name, id = %self.id, "Failed to encode synthetic frame: {}", e);
                None
            }
        }
    }

    /// Swap the pass-through interceptor back into the proxy's slot
    pub fn restore_pass_through(&self) {
        if let Some(proxy) = self.proxy.upgrade() {
            proxy.interceptor().reset();
        }
    }
}

/// A fault simulation driven by an interceptor installed on a Layer 7 proxy
pub struct ApplicationFault<I: FaultInterceptor> {
    id: String,
    name: &'static str,
    fault_type: FaultType,
    proxy: Arc<dyn ApplicationProxy>,
    interceptor: Arc<I>,
}

impl<I: FaultInterceptor> ApplicationFault<I> {
    pub fn new(
        id: &str,
        name: &'static str,
        fault_type: FaultType,
        proxy: Arc<dyn ApplicationProxy>,
        interceptor: I,
    ) -> Self {
        ApplicationFault {
            id: id.to_string(),
            name,
            fault_type,
            proxy,
            interceptor: Arc::new(interceptor),
        }
    }

    pub fn application_proxy(&self) -> &Arc<dyn ApplicationProxy> {
        &self.proxy
    }

    pub fn interceptor(&self) -> &Arc<I> {
        &self.interceptor
    }
}

impl<I: FaultInterceptor> FaultSimulation for ApplicationFault<I> {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn fault_type(&self) -> FaultType {
        self.fault_type
    }

    fn proxy(&self) -> ProxyHandle {
        ProxyHandle::Application(self.proxy.clone())
    }

    fn enable(&self) -> Result<(), FaultError> {
        info!(fault = self.name, id = %self.id, "Enabling fault");
        // Callers still holding the previous install may have touched the state
        self.interceptor.reset();
        self.proxy.interceptor().install(self.interceptor.clone());
        Ok(())
    }

    fn resolve(&self) -> Result<(), FaultError> {
        info!(fault = self.name, id = %self.id, "Resolving fault");
        self.proxy.interceptor().reset();
        self.interceptor.reset();
        Ok(())
    }

    fn clean_up(&self) {
        self.proxy.interceptor().reset();
        self.interceptor.reset();
        self.proxy.stop();
    }
}

/// Interceptor that never interferes; validates the Layer 7 harness itself
pub struct NoInterference;

impl Interceptor for NoInterference {
    fn intercept_connection(&self, params: ConnectionParams) -> ConnectionParams {
        params
    }

    fn intercept_frame(&self, direction: FrameDirection, frame: Frame) -> Vec<Action> {
        Action::pass(direction, frame)
    }
}

impl FaultInterceptor for NoInterference {
    fn reset(&self) {}
}

pub type NullApplicationLayerFault = ApplicationFault<NoInterference>;

impl NullApplicationLayerFault {
    pub fn create(id: &str, proxy: Arc<dyn ApplicationProxy>) -> Self {
        ApplicationFault::new(
            id,
            catalog::application::NULL,
            FaultType::nonfatal(Duration::from_secs(10)),
            proxy,
            NoInterference,
        )
    }
}
