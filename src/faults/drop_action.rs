use super::application::{ApplicationFault, ApplicationLayer, FaultInterceptor};
use super::{catalog, FaultType};
use crate::protocol::{Action, ConnectionParams, Frame, FrameDirection, ProtocolAction};
use crate::proxy::{ApplicationProxy, Interceptor};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
struct DropState {
    dropped: u32,
    initial_connection: bool,
}

impl Default for DropState {
    fn default() -> Self {
        DropState {
            dropped: 0,
            initial_connection: true,
        }
    }
}

/// Drops up to `drop_limit` frames carrying `action` in `direction`.
///
/// A second connection attempt resolves the fault: the client reconnecting
/// means it has already noticed the missing response.
pub struct DropActionInterceptor {
    layer: ApplicationLayer,
    direction: FrameDirection,
    action: ProtocolAction,
    drop_limit: u32,
    state: Mutex<DropState>,
}

impl DropActionInterceptor {
    pub fn dropped(&self) -> u32 {
        self.state.lock().dropped
    }
}

impl Interceptor for DropActionInterceptor {
    fn intercept_connection(&self, params: ConnectionParams) -> ConnectionParams {
        let reconnected = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.initial_connection, false)
        };
        if reconnected {
            debug!(fault = self.layer.name, id = %self.layer.id, "Second connection, resolving fault");
            self.layer.restore_pass_through();
            self.reset();
        }
        params
    }

    fn intercept_frame(&self, direction: FrameDirection, frame: Frame) -> Vec<Action> {
        let mut state = self.state.lock();
        let matches = state.dropped < self.drop_limit
            && self
                .layer
                .decode_in(direction, self.direction, &frame)
                .map_or(false, |msg| msg.is_action(self.action));

        if matches {
            state.dropped += 1;
            debug!(
                fault = self.layer.name,
                id = %self.layer.id,
                %direction,
                dropped = state.dropped,
                "Dropping {:?}",
                self.action
            );
            Vec::new()
        } else {
            Action::pass(direction, frame)
        }
    }
}

impl FaultInterceptor for DropActionInterceptor {
    fn reset(&self) {
        *self.state.lock() = DropState::default();
    }
}

pub type DropAction = ApplicationFault<DropActionInterceptor>;

impl DropAction {
    pub fn create(
        id: &str,
        name: &'static str,
        proxy: Arc<dyn ApplicationProxy>,
        direction: FrameDirection,
        action: ProtocolAction,
        drop_limit: u32,
    ) -> Self {
        let interceptor = DropActionInterceptor {
            layer: ApplicationLayer::new(id, name, &proxy),
            direction,
            action,
            drop_limit,
            state: Mutex::new(DropState::default()),
        };
        ApplicationFault::new(
            id,
            name,
            FaultType::nonfatal(Duration::from_secs(120)),
            proxy,
            interceptor,
        )
    }

    /// The server never acknowledges a channel attach
    pub fn attach_unresponsive(id: &str, proxy: Arc<dyn ApplicationProxy>) -> Self {
        Self::create(
            id,
            catalog::application::ATTACH_UNRESPONSIVE,
            proxy,
            FrameDirection::ClientToServer,
            ProtocolAction::Attach,
            1,
        )
    }

    /// The server never acknowledges a channel detach
    pub fn detach_unresponsive(id: &str, proxy: Arc<dyn ApplicationProxy>) -> Self {
        Self::create(
            id,
            catalog::application::DETACH_UNRESPONSIVE,
            proxy,
            FrameDirection::ClientToServer,
            ProtocolAction::Detach,
            1,
        )
    }
}
