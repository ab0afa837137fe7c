use super::application::{ApplicationFault, ApplicationLayer, FaultInterceptor};
use super::{catalog, FaultType};
use crate::protocol::{Action, ConnectionParams, Frame, FrameDirection, ProtocolAction};
use crate::proxy::{ApplicationProxy, Interceptor};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Connections seen before the fault resolves by itself
const RESTORE_AFTER_CONNECTIONS: u32 = 2;

#[derive(Debug, Default)]
struct UnresponsiveState {
    connections: u32,
    triggered: bool,
}

/// Goes silent forever once `action` is seen travelling in `direction`:
/// every later frame, in either direction, is dropped. The client must go
/// through its full detection-and-reconnect path; its reconnect resolves it.
pub struct UnresponsiveInterceptor {
    layer: ApplicationLayer,
    direction: FrameDirection,
    action: ProtocolAction,
    state: Mutex<UnresponsiveState>,
}

impl UnresponsiveInterceptor {
    pub fn is_triggered(&self) -> bool {
        self.state.lock().triggered
    }
}

impl Interceptor for UnresponsiveInterceptor {
    fn intercept_connection(&self, params: ConnectionParams) -> ConnectionParams {
        let connections = {
            let mut state = self.state.lock();
            state.connections += 1;
            state.connections
        };
        if connections >= RESTORE_AFTER_CONNECTIONS {
            debug!(
                fault = self.layer.name,
                id = %self.layer.id,
                "Resolved after {} connections",
                RESTORE_AFTER_CONNECTIONS
            );
            self.layer.restore_pass_through();
            self.reset();
        }
        params
    }

    fn intercept_frame(&self, direction: FrameDirection, frame: Frame) -> Vec<Action> {
        let mut state = self.state.lock();
        if !state.triggered
            && self
                .layer
                .decode_in(direction, self.direction, &frame)
                .map_or(false, |msg| msg.is_action(self.action))
        {
            debug!(fault = self.layer.name, id = %self.layer.id, "{:?} seen, connection going unresponsive", self.action);
            state.triggered = true;
        }

        if state.triggered {
            debug!(fault = self.layer.name, id = %self.layer.id, %direction, "Unresponsive: dropping {}", frame.describe());
            Vec::new()
        } else {
            Action::pass(direction, frame)
        }
    }
}

impl FaultInterceptor for UnresponsiveInterceptor {
    fn reset(&self) {
        *self.state.lock() = UnresponsiveState::default();
    }
}

pub type UnresponsiveAfterAction = ApplicationFault<UnresponsiveInterceptor>;

impl UnresponsiveAfterAction {
    pub fn create(
        id: &str,
        name: &'static str,
        proxy: Arc<dyn ApplicationProxy>,
        direction: FrameDirection,
        action: ProtocolAction,
    ) -> Self {
        let interceptor = UnresponsiveInterceptor {
            layer: ApplicationLayer::new(id, name, &proxy),
            direction,
            action,
            state: Mutex::new(UnresponsiveState::default()),
        };
        ApplicationFault::new(
            id,
            name,
            FaultType::nonfatal(Duration::from_secs(150)),
            proxy,
            interceptor,
        )
    }

    /// Connection goes unresponsive after an outgoing presence message
    pub fn enter_unresponsive(id: &str, proxy: Arc<dyn ApplicationProxy>) -> Self {
        Self::create(
            id,
            catalog::application::ENTER_UNRESPONSIVE,
            proxy,
            FrameDirection::ClientToServer,
            ProtocolAction::Presence,
        )
    }
}
