use super::application::{ApplicationFault, ApplicationLayer, FaultInterceptor};
use super::{catalog, FaultType};
use crate::protocol::{
    corrupt_resume_token, Action, ConnectionParams, Frame, FrameDirection, ProtocolAction,
};
use crate::proxy::{ApplicationProxy, Interceptor};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Whether we're waiting to kill the connection or to tamper with the resume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumePhase {
    #[default]
    AwaitingInitialConnection,
    AwaitingDisconnect,
    Reconnected,
}

/// Disconnects the client right after a channel attach succeeds, then
/// swaps the connection id in the reconnect's `resume` parameter for a fake
/// one so the resume fails instead of continuing the session.
pub struct FailedResumeInterceptor {
    layer: ApplicationLayer,
    phase: Mutex<ResumePhase>,
}

impl FailedResumeInterceptor {
    pub fn phase(&self) -> ResumePhase {
        *self.phase.lock()
    }
}

impl Interceptor for FailedResumeInterceptor {
    fn intercept_connection(&self, params: ConnectionParams) -> ConnectionParams {
        let mut phase = self.phase.lock();
        match *phase {
            ResumePhase::AwaitingInitialConnection => {
                *phase = ResumePhase::AwaitingDisconnect;
                debug!(fault = self.layer.name, id = %self.layer.id, %params, "Transitioning to {:?}", *phase);
                params
            }
            ResumePhase::AwaitingDisconnect => {
                *phase = ResumePhase::Reconnected;
                let params = ConnectionParams {
                    resume: params.resume.as_deref().map(corrupt_resume_token),
                    ..params
                };
                debug!(fault = self.layer.name, id = %self.layer.id, %params, "Transitioning to {:?}", *phase);
                params
            }
            ResumePhase::Reconnected => params,
        }
    }

    fn intercept_frame(&self, direction: FrameDirection, frame: Frame) -> Vec<Action> {
        let phase = self.phase.lock();
        if *phase != ResumePhase::AwaitingDisconnect {
            return Action::pass(direction, frame);
        }

        let attached = self
            .layer
            .decode_in(direction, FrameDirection::ServerToClient, &frame)
            .map_or(false, |msg| msg.is_action(ProtocolAction::Attached));
        if attached {
            debug!(fault = self.layer.name, id = %self.layer.id, "ATTACHED seen, forcing disconnect");
            vec![Action::new(direction, frame), Action::close(direction)]
        } else {
            Action::pass(direction, frame)
        }
    }
}

impl FaultInterceptor for FailedResumeInterceptor {
    fn reset(&self) {
        *self.phase.lock() = ResumePhase::default();
    }
}

pub type DisconnectWithFailedResume = ApplicationFault<FailedResumeInterceptor>;

impl DisconnectWithFailedResume {
    pub fn create(id: &str, proxy: Arc<dyn ApplicationProxy>) -> Self {
        let name = catalog::application::DISCONNECT_WITH_FAILED_RESUME;
        let interceptor = FailedResumeInterceptor {
            layer: ApplicationLayer::new(id, name, &proxy),
            phase: Mutex::new(ResumePhase::default()),
        };
        ApplicationFault::new(
            id,
            name,
            FaultType::nonfatal(Duration::from_secs(30)),
            proxy,
            interceptor,
        )
    }
}
