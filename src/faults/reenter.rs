use super::application::{ApplicationFault, ApplicationLayer, FaultInterceptor};
use super::{catalog, FaultType};
use crate::protocol::message::nonfatal_nack;
use crate::protocol::{
    Action, ConnectionParams, Frame, FrameDirection, PresenceAction, ProtocolAction,
};
use crate::proxy::{ApplicationProxy, Interceptor};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Where the client is in the enter, disconnect, resume, re-enter cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReenterPhase {
    /// Force a disconnect after the first outgoing PRESENCE, then wait for
    /// the client to reconnect
    #[default]
    DisconnectAfterPresence,
    /// Strip the members from the post-resume SYNC
    InterceptingServerSync,
    /// Record the serial of the client's automatic re-entry
    InterceptingClientEnter,
    /// Turn the server's ACK of the re-entry into a NACK
    InterceptingServerAck,
    WorkingNormally,
}

#[derive(Debug, Default)]
struct ReenterState {
    phase: ReenterPhase,
    disconnect_injected: bool,
    presence_enter_serial: Option<i64>,
}

/// Lets a resume succeed but makes the server appear to have lost the
/// client's presence membership, then fails the client's attempt to re-enter.
pub struct ReenterInterceptor {
    layer: ApplicationLayer,
    state: Mutex<ReenterState>,
}

impl ReenterInterceptor {
    pub fn phase(&self) -> ReenterPhase {
        self.state.lock().phase
    }

    pub fn presence_enter_serial(&self) -> Option<i64> {
        self.state.lock().presence_enter_serial
    }

    fn advance(&self, state: &mut ReenterState, next: ReenterPhase) {
        debug!(fault = self.layer.name, id = %self.layer.id, from = ?state.phase, to = ?next, "Phase change");
        state.phase = next;
    }
}

impl Interceptor for ReenterInterceptor {
    fn intercept_connection(&self, params: ConnectionParams) -> ConnectionParams {
        let mut state = self.state.lock();
        if state.phase == ReenterPhase::DisconnectAfterPresence && state.disconnect_injected {
            self.advance(&mut state, ReenterPhase::InterceptingServerSync);
        }
        params
    }

    fn intercept_frame(&self, direction: FrameDirection, frame: Frame) -> Vec<Action> {
        let mut state = self.state.lock();
        let phase = state.phase;
        match phase {
            ReenterPhase::DisconnectAfterPresence if !state.disconnect_injected => {
                let presence = self
                    .layer
                    .decode_in(direction, FrameDirection::ClientToServer, &frame)
                    .map_or(false, |msg| msg.is_action(ProtocolAction::Presence));
                if presence {
                    debug!(fault = self.layer.name, id = %self.layer.id, "PRESENCE seen, forcing disconnect");
                    state.disconnect_injected = true;
                    return vec![
                        Action::new(direction, frame),
                        Action::close(FrameDirection::ServerToClient),
                    ];
                }
            }
            ReenterPhase::InterceptingServerSync => {
                if let Some(mut msg) = self
                    .layer
                    .decode_in(direction, FrameDirection::ServerToClient, &frame)
                    .filter(|msg| msg.is_action(ProtocolAction::Sync))
                {
                    msg.set("presence", Value::Array(Vec::new()));
                    if let Some(rewritten) = self.layer.encode(&msg) {
                        self.advance(&mut state, ReenterPhase::InterceptingClientEnter);
                        return vec![Action::new(direction, rewritten)];
                    }
                }
            }
            ReenterPhase::InterceptingClientEnter => {
                if let Some(msg) = self
                    .layer
                    .decode_in(direction, FrameDirection::ClientToServer, &frame)
                    .filter(|msg| {
                        msg.is_action(ProtocolAction::Presence)
                            && msg.is_presence_action(PresenceAction::Enter)
                    })
                {
                    state.presence_enter_serial = msg.msg_serial();
                    self.advance(&mut state, ReenterPhase::InterceptingServerAck);
                }
            }
            ReenterPhase::InterceptingServerAck => {
                let serial = state.presence_enter_serial;
                let acked = self
                    .layer
                    .decode_in(direction, FrameDirection::ServerToClient, &frame)
                    .filter(|msg| msg.is_action(ProtocolAction::Ack))
                    .map_or(false, |msg| serial.is_some() && msg.msg_serial() == serial);
                if acked {
                    if let Some(nack) = serial.and_then(|s| self.layer.encode(&nonfatal_nack(s))) {
                        self.advance(&mut state, ReenterPhase::WorkingNormally);
                        return vec![Action::new(direction, nack)];
                    }
                }
            }
            ReenterPhase::DisconnectAfterPresence | ReenterPhase::WorkingNormally => {}
        }
        Action::pass(direction, frame)
    }
}

impl FaultInterceptor for ReenterInterceptor {
    fn reset(&self) {
        *self.state.lock() = ReenterState::default();
    }
}

pub type ReenterOnResumeFailed = ApplicationFault<ReenterInterceptor>;

impl ReenterOnResumeFailed {
    pub fn create(id: &str, proxy: Arc<dyn ApplicationProxy>) -> Self {
        let name = catalog::application::REENTER_ON_RESUME_FAILED;
        let interceptor = ReenterInterceptor {
            layer: ApplicationLayer::new(id, name, &proxy),
            state: Mutex::new(ReenterState::default()),
        };
        ApplicationFault::new(
            id,
            name,
            FaultType::nonfatal(Duration::from_secs(60)),
            proxy,
            interceptor,
        )
    }
}
