use crate::protocol::{Action, ConnectionParams, Frame, FrameDirection};
use parking_lot::RwLock;
use std::sync::Arc;

/// Per-connection hook invoked by an application-layer proxy.
///
/// Both operations run synchronously on the connection's I/O path and must
/// never block or panic. Implementations keep their state behind a mutex:
/// the initial connection and a reconnect may call in concurrently.
pub trait Interceptor: Send + Sync {
    /// Called once per connection attempt, before the handshake completes
    fn intercept_connection(&self, params: ConnectionParams) -> ConnectionParams;

    /// Called once per observed frame; returns the frames to send instead
    fn intercept_frame(&self, direction: FrameDirection, frame: Frame) -> Vec<Action>;
}

/// Forwards every connection and frame unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughInterceptor;

impl Interceptor for PassThroughInterceptor {
    fn intercept_connection(&self, params: ConnectionParams) -> ConnectionParams {
        params
    }

    fn intercept_frame(&self, direction: FrameDirection, frame: Frame) -> Vec<Action> {
        Action::pass(direction, frame)
    }
}

/// The swappable interceptor of an application-layer proxy.
///
/// Writers replace the whole `Arc` under the write lock. Readers clone the
/// current `Arc` under the read lock and invoke it after releasing the lock,
/// so an interceptor can reset the slot from inside its own callback.
pub struct InterceptorSlot {
    current: RwLock<Arc<dyn Interceptor>>,
}

impl InterceptorSlot {
    pub fn new() -> Self {
        InterceptorSlot {
            current: RwLock::new(Arc::new(PassThroughInterceptor)),
        }
    }

    pub fn install(&self, interceptor: Arc<dyn Interceptor>) {
        *self.current.write() = interceptor;
    }

    /// Restore pass-through behaviour
    pub fn reset(&self) {
        self.install(Arc::new(PassThroughInterceptor));
    }

    pub fn current(&self) -> Arc<dyn Interceptor> {
        self.current.read().clone()
    }

    pub fn intercept_connection(&self, params: ConnectionParams) -> ConnectionParams {
        self.current().intercept_connection(params)
    }

    pub fn intercept_frame(&self, direction: FrameDirection, frame: Frame) -> Vec<Action> {
        self.current().intercept_frame(direction, frame)
    }
}

impl Default for InterceptorSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterceptorSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorSlot").finish_non_exhaustive()
    }
}
