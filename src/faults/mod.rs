//! Fault Simulations
//!
//! A [`Fault`] is a named factory; each call to [`Fault::simulate`] builds a
//! fresh [`FaultSimulation`] bound to its own proxy. The driver then:
//!
//! 1. starts the simulation's proxy and points the client under test at it
//! 2. calls `enable()` to break the connection in the fault-specific way
//! 3. optionally calls `resolve()` to restore transparent proxying
//! 4. always calls `clean_up()` at teardown
//!
//! Faults never assert anything about the client; the attached
//! [`FaultType`] tells the driver what client behaviour to expect.

pub mod application;
pub mod catalog;
pub mod drop_action;
pub mod failed_resume;
pub mod presence_nack;
pub mod reenter;
pub mod registry;
pub mod timer;
pub mod transport;
pub mod unresponsive;

pub use application::{ApplicationFault, ApplicationLayer, FaultInterceptor, NullApplicationLayerFault};
pub use drop_action::DropAction;
pub use failed_resume::DisconnectWithFailedResume;
pub use presence_nack::PresenceNack;
pub use reenter::ReenterOnResumeFailed;
pub use registry::FaultRegistry;
pub use timer::RestartTimer;
pub use transport::{
    DisconnectAndSuspend, NullTransportFault, TcpConnectionRefused, TcpConnectionUnresponsive,
};
pub use unresponsive::UnresponsiveAfterAction;

use crate::config::HarnessConfig;
use crate::proxy::{ProxyError, ProxyFactory, ProxyHandle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Expected client behaviour during and after a fault.
///
/// Test-oracle metadata only: interceptors never branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FaultType {
    /// Client stays or returns online within the bound, without `resolve()`
    #[serde(rename = "nonfatal", rename_all = "camelCase")]
    Nonfatal { resolved_within_millis: u64 },
    /// Client goes offline within the first bound while the fault is active,
    /// and returns online within the second bound after `resolve()`
    #[serde(rename = "nonfatalWhenResolved", rename_all = "camelCase")]
    NonfatalWhenResolved {
        offline_within_millis: u64,
        online_within_millis: u64,
    },
    /// Client reaches a terminal failed state within the bound
    #[serde(rename = "fatal", rename_all = "camelCase")]
    Fatal { failed_within_millis: u64 },
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl FaultType {
    pub fn nonfatal(resolved_within: Duration) -> Self {
        FaultType::Nonfatal {
            resolved_within_millis: millis(resolved_within),
        }
    }

    pub fn nonfatal_when_resolved(offline_within: Duration, online_within: Duration) -> Self {
        FaultType::NonfatalWhenResolved {
            offline_within_millis: millis(offline_within),
            online_within_millis: millis(online_within),
        }
    }

    pub fn fatal(failed_within: Duration) -> Self {
        FaultType::Fatal {
            failed_within_millis: millis(failed_within),
        }
    }

    /// Longest time the driver should wait for the client to settle
    pub fn settle_within(&self) -> Duration {
        let millis = match *self {
            FaultType::Nonfatal {
                resolved_within_millis,
            } => resolved_within_millis,
            FaultType::NonfatalWhenResolved {
                offline_within_millis,
                online_within_millis,
            } => offline_within_millis.max(online_within_millis),
            FaultType::Fatal {
                failed_within_millis,
            } => failed_within_millis,
        };
        Duration::from_millis(millis)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, FaultType::Fatal { .. })
    }
}

/// Error returned when a simulation cannot change its proxy's state
#[derive(Debug)]
pub enum FaultError {
    Proxy(ProxyError),
    /// Scheduling a timer requires a tokio runtime on the calling thread
    NoRuntime,
}

impl std::fmt::Display for FaultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultError::Proxy(e) => write!(f, "Proxy error: {}", e),
            FaultError::NoRuntime => write!(f, "Fault timers require a tokio runtime"),
        }
    }
}

impl std::error::Error for FaultError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FaultError::Proxy(e) => Some(e),
            FaultError::NoRuntime => None,
        }
    }
}

impl From<ProxyError> for FaultError {
    fn from(e: ProxyError) -> Self {
        FaultError::Proxy(e)
    }
}

/// One armed-or-armable instance of a fault, owning its proxy.
pub trait FaultSimulation: Send + Sync {
    /// Identifier given to `simulate`, used in logs
    fn id(&self) -> &str;

    fn name(&self) -> &'static str;

    fn fault_type(&self) -> FaultType;

    fn proxy(&self) -> ProxyHandle;

    /// Break the proxy. Call after the proxy has been started.
    fn enable(&self) -> Result<(), FaultError>;

    /// Restore transparent proxying. Safe to repeat, and safe before `enable`.
    fn resolve(&self) -> Result<(), FaultError>;

    /// Teardown: stop the proxy and cancel anything pending. Never fails.
    fn clean_up(&self) {
        self.proxy().stop();
    }
}

/// Builds a simulation from its id, a proxy factory and the harness config
pub type SimulationBuilder =
    fn(&str, &dyn ProxyFactory, &HarnessConfig) -> Box<dyn FaultSimulation>;

/// A named, stateless factory of fault simulations
#[derive(Clone)]
pub struct Fault {
    name: &'static str,
    build: SimulationBuilder,
    factory: Arc<dyn ProxyFactory>,
    config: Arc<HarnessConfig>,
}

impl Fault {
    pub fn new(
        name: &'static str,
        build: SimulationBuilder,
        factory: Arc<dyn ProxyFactory>,
        config: Arc<HarnessConfig>,
    ) -> Self {
        Fault {
            name,
            build,
            factory,
            config,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Construct a fresh simulation; no network side effects
    pub fn simulate(&self, id: &str) -> Box<dyn FaultSimulation> {
        (self.build)(id, self.factory.as_ref(), &self.config)
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

impl std::fmt::Debug for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fault").field("name", &self.name).finish()
    }
}
