use super::FaultError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
struct TimerState {
    /// Bumped on every schedule and cancel; a task only fires if it still
    /// holds the current generation.
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

/// A single cancellable delayed action.
///
/// The firing task checks its generation and runs the action while holding
/// the same lock `cancel` takes, so an action that lost the race against
/// `cancel` never runs, and one that won has finished before `cancel` returns.
#[derive(Clone, Default)]
pub struct RestartTimer {
    state: Arc<Mutex<TimerState>>,
}

impl RestartTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay`, replacing any pending action
    pub fn schedule<F>(&self, delay: Duration, action: F) -> Result<(), FaultError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|_| FaultError::NoRuntime)?;
        let mut state = self.state.lock();
        state.generation += 1;
        if let Some(previous) = state.pending.take() {
            previous.abort();
        }

        let generation = state.generation;
        let shared = self.state.clone();
        state.pending = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = shared.lock();
            if state.generation != generation {
                debug!(generation, "Cancelled timer fired; ignoring");
                return;
            }
            state.pending = None;
            action();
        }));
        Ok(())
    }

    /// Cancel the pending action, if any. Idempotent.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }
}
