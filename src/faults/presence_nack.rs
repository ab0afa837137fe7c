use super::application::{ApplicationFault, ApplicationLayer, FaultInterceptor};
use super::{catalog, FaultType};
use crate::protocol::message::nonfatal_nack;
use crate::protocol::{
    Action, ConnectionParams, Frame, FrameDirection, PresenceAction, ProtocolAction,
};
use crate::proxy::{ApplicationProxy, Interceptor};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of presence messages nacked before letting them through
pub const DEFAULT_NACK_LIMIT: u32 = 3;

/// Answers outgoing presence messages of one kind with a fabricated non-fatal
/// NACK instead of forwarding them, up to `nack_limit` times. The client's
/// retries after that reach the server normally.
pub struct PresenceNackInterceptor {
    layer: ApplicationLayer,
    presence_action: PresenceAction,
    nack_limit: u32,
    nacks_sent: Mutex<u32>,
}

impl PresenceNackInterceptor {
    pub fn nacks_sent(&self) -> u32 {
        *self.nacks_sent.lock()
    }
}

impl Interceptor for PresenceNackInterceptor {
    fn intercept_connection(&self, params: ConnectionParams) -> ConnectionParams {
        params
    }

    fn intercept_frame(&self, direction: FrameDirection, frame: Frame) -> Vec<Action> {
        let mut nacks_sent = self.nacks_sent.lock();
        if *nacks_sent >= self.nack_limit {
            return Action::pass(direction, frame);
        }

        let msg = match self.layer.decode_in(direction, FrameDirection::ClientToServer, &frame) {
            Some(msg)
                if msg.is_action(ProtocolAction::Presence)
                    && msg.is_presence_action(self.presence_action) =>
            {
                msg
            }
            _ => return Action::pass(direction, frame),
        };

        let msg_serial = match msg.msg_serial() {
            Some(serial) => serial,
            None => {
                warn!(fault = self.layer.name, id = %self.layer.id, "Presence message without msgSerial, passing through");
                return Action::pass(direction, frame);
            }
        };
        let nack = match self.layer.encode(&nonfatal_nack(msg_serial)) {
            Some(nack) => nack,
            None => return Action::pass(direction, frame),
        };

        *nacks_sent += 1;
        debug!(
            fault = self.layer.name,
            id = %self.layer.id,
            msg_serial,
            nacks_sent = *nacks_sent,
            "Replying to {:?} with NACK",
            self.presence_action
        );
        vec![Action::new(FrameDirection::ServerToClient, nack)]
    }
}

impl FaultInterceptor for PresenceNackInterceptor {
    fn reset(&self) {
        *self.nacks_sent.lock() = 0;
    }
}

pub type PresenceNack = ApplicationFault<PresenceNackInterceptor>;

impl PresenceNack {
    pub fn create(
        id: &str,
        name: &'static str,
        proxy: Arc<dyn ApplicationProxy>,
        presence_action: PresenceAction,
        nack_limit: u32,
    ) -> Self {
        let interceptor = PresenceNackInterceptor {
            layer: ApplicationLayer::new(id, name, &proxy),
            presence_action,
            nack_limit,
            nacks_sent: Mutex::new(0),
        };
        ApplicationFault::new(
            id,
            name,
            FaultType::nonfatal(Duration::from_secs(60)),
            proxy,
            interceptor,
        )
    }

    pub fn enter_failed_with_nonfatal_nack(
        id: &str,
        proxy: Arc<dyn ApplicationProxy>,
        nack_limit: u32,
    ) -> Self {
        Self::create(
            id,
            catalog::application::ENTER_FAILED_WITH_NONFATAL_NACK,
            proxy,
            PresenceAction::Enter,
            nack_limit,
        )
    }

    pub fn update_failed_with_nonfatal_nack(
        id: &str,
        proxy: Arc<dyn ApplicationProxy>,
        nack_limit: u32,
    ) -> Self {
        Self::create(
            id,
            catalog::application::UPDATE_FAILED_WITH_NONFATAL_NACK,
            proxy,
            PresenceAction::Update,
            nack_limit,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::FaultSimulation;
    use crate::protocol::{JsonCodec, Message, ProtocolCodec};
    use crate::proxy::Layer7Proxy;
    use serde_json::json;

    fn presence_frame(action: PresenceAction, msg_serial: i64) -> Frame {
        let msg = Message::with_action(ProtocolAction::Presence)
            .with_field("msgSerial", msg_serial)
            .with_field("presence", json!([{ "action": action.code(), "clientId": "c1" }]));
        Frame::Binary(JsonCodec.encode(&msg).unwrap())
    }

    fn setup() -> (Arc<dyn ApplicationProxy>, PresenceNack) {
        let proxy: Arc<dyn ApplicationProxy> = Arc::new(Layer7Proxy::new("nack", Arc::new(JsonCodec)));
        let fault = PresenceNack::enter_failed_with_nonfatal_nack("nack", proxy.clone(), DEFAULT_NACK_LIMIT);
        proxy.start().unwrap();
        fault.enable().unwrap();
        (proxy, fault)
    }

    #[test]
    fn test_nacks_up_to_limit_then_passes() {
        let (proxy, fault) = setup();
        let slot = proxy.interceptor();

        for serial in 0..3 {
            let actions = slot.intercept_frame(FrameDirection::ClientToServer, presence_frame(PresenceAction::Enter, serial));
            assert_eq!(actions.len(), 1);
            assert_eq!(actions[0].direction, FrameDirection::ServerToClient);
            assert!(!actions[0].send_and_close);

            let nack = JsonCodec.decode(actions[0].frame.binary_payload().unwrap()).unwrap();
            assert!(nack.is_action(ProtocolAction::Nack));
            assert_eq!(nack.msg_serial(), Some(serial));
            assert_eq!(nack.get("error").unwrap()["code"], json!(50000));
        }
        assert_eq!(fault.interceptor().nacks_sent(), 3);

        let fourth = presence_frame(PresenceAction::Enter, 3);
        assert_eq!(
            slot.intercept_frame(FrameDirection::ClientToServer, fourth.clone()),
            Action::pass(FrameDirection::ClientToServer, fourth)
        );
        assert_eq!(fault.interceptor().nacks_sent(), 3);
    }

    #[test]
    fn test_other_presence_actions_pass() {
        let (proxy, fault) = setup();
        let slot = proxy.interceptor();

        let update = presence_frame(PresenceAction::Update, 1);
        assert_eq!(
            slot.intercept_frame(FrameDirection::ClientToServer, update.clone()),
            Action::pass(FrameDirection::ClientToServer, update)
        );
        let inbound = presence_frame(PresenceAction::Enter, 1);
        assert_eq!(slot.intercept_frame(FrameDirection::ServerToClient, inbound).len(), 1);
        assert_eq!(fault.interceptor().nacks_sent(), 0);
    }

    #[test]
    fn test_missing_serial_passes_through() {
        let (proxy, fault) = setup();
        let msg = Message::with_action(ProtocolAction::Presence)
            .with_field("presence", json!([{ "action": PresenceAction::Enter.code() }]));
        let frame = Frame::Binary(JsonCodec.encode(&msg).unwrap());
        let actions = proxy.interceptor().intercept_frame(FrameDirection::ClientToServer, frame.clone());
        assert_eq!(actions, Action::pass(FrameDirection::ClientToServer, frame));
        assert_eq!(fault.interceptor().nacks_sent(), 0);
    }

    #[test]
    fn test_update_variant_and_resolve() {
        let proxy: Arc<dyn ApplicationProxy> = Arc::new(Layer7Proxy::new("nack", Arc::new(JsonCodec)));
        let fault = PresenceNack::update_failed_with_nonfatal_nack("nack", proxy.clone(), 1);
        assert_eq!(fault.name(), "UpdateFailedWithNonfatalNack");
        fault.enable().unwrap();

        let slot = proxy.interceptor();
        let actions = slot.intercept_frame(FrameDirection::ClientToServer, presence_frame(PresenceAction::Update, 9));
        assert_eq!(actions[0].direction, FrameDirection::ServerToClient);

        fault.resolve().unwrap();
        assert_eq!(fault.interceptor().nacks_sent(), 0);
        let frame = presence_frame(PresenceAction::Update, 10);
        assert_eq!(
            slot.intercept_frame(FrameDirection::ClientToServer, frame.clone()),
            Action::pass(FrameDirection::ClientToServer, frame)
        );
    }
}
