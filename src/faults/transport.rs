//! Transport-layer faults
//!
//! These never look at frames; they only control whether the Layer 4 proxy
//! accepts and forwards connections.

use super::{catalog, FaultError, FaultSimulation, FaultType, RestartTimer};
use crate::proxy::{ProxyHandle, TransportProxy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default time DisconnectAndSuspend keeps the proxy down
pub const SUSPEND_DELAY: Duration = Duration::from_secs(2 * 60);

/// The proxy and identity shared by every transport-layer fault
pub struct TransportLayer {
    id: String,
    proxy: Arc<dyn TransportProxy>,
}

impl TransportLayer {
    pub fn new(id: &str, proxy: Arc<dyn TransportProxy>) -> Self {
        TransportLayer {
            id: id.to_string(),
            proxy,
        }
    }

    pub fn proxy(&self) -> &Arc<dyn TransportProxy> {
        &self.proxy
    }

    fn handle(&self) -> ProxyHandle {
        ProxyHandle::Transport(self.proxy.clone())
    }
}

/// Breaks nothing; ensures the test code works through a plain proxy
pub struct NullTransportFault {
    layer: TransportLayer,
}

impl NullTransportFault {
    pub fn new(id: &str, proxy: Arc<dyn TransportProxy>) -> Self {
        NullTransportFault {
            layer: TransportLayer::new(id, proxy),
        }
    }
}

impl FaultSimulation for NullTransportFault {
    fn id(&self) -> &str {
        &self.layer.id
    }

    fn name(&self) -> &'static str {
        catalog::transport::NULL
    }

    fn fault_type(&self) -> FaultType {
        FaultType::nonfatal(Duration::from_secs(10))
    }

    fn proxy(&self) -> ProxyHandle {
        self.layer.handle()
    }

    fn enable(&self) -> Result<(), FaultError> {
        Ok(())
    }

    fn resolve(&self) -> Result<(), FaultError> {
        Ok(())
    }
}

/// Prevents the proxy from accepting TCP connections while active
pub struct TcpConnectionRefused {
    layer: TransportLayer,
}

impl TcpConnectionRefused {
    pub fn new(id: &str, proxy: Arc<dyn TransportProxy>) -> Self {
        TcpConnectionRefused {
            layer: TransportLayer::new(id, proxy),
        }
    }
}

impl FaultSimulation for TcpConnectionRefused {
    fn id(&self) -> &str {
        &self.layer.id
    }

    fn name(&self) -> &'static str {
        catalog::transport::CONNECTION_REFUSED
    }

    fn fault_type(&self) -> FaultType {
        FaultType::nonfatal_when_resolved(Duration::from_secs(30), Duration::from_secs(60))
    }

    fn proxy(&self) -> ProxyHandle {
        self.layer.handle()
    }

    fn enable(&self) -> Result<(), FaultError> {
        info!(fault = self.name(), id = %self.layer.id, "Refusing connections");
        self.layer.proxy.stop();
        Ok(())
    }

    fn resolve(&self) -> Result<(), FaultError> {
        info!(fault = self.name(), id = %self.layer.id, "Accepting connections again");
        self.layer.proxy.start()?;
        Ok(())
    }
}

/// Hangs the connection by forwarding nothing in either direction
pub struct TcpConnectionUnresponsive {
    layer: TransportLayer,
}

impl TcpConnectionUnresponsive {
    pub fn new(id: &str, proxy: Arc<dyn TransportProxy>) -> Self {
        TcpConnectionUnresponsive {
            layer: TransportLayer::new(id, proxy),
        }
    }
}

impl FaultSimulation for TcpConnectionUnresponsive {
    fn id(&self) -> &str {
        &self.layer.id
    }

    fn name(&self) -> &'static str {
        catalog::transport::CONNECTION_UNRESPONSIVE
    }

    fn fault_type(&self) -> FaultType {
        FaultType::nonfatal_when_resolved(Duration::from_secs(120), Duration::from_secs(60))
    }

    fn proxy(&self) -> ProxyHandle {
        self.layer.handle()
    }

    fn enable(&self) -> Result<(), FaultError> {
        self.layer.proxy.set_forwarding(false);
        Ok(())
    }

    fn resolve(&self) -> Result<(), FaultError> {
        self.layer.proxy.set_forwarding(true);
        Ok(())
    }
}

/// Rejects connections entirely for the suspend delay, then comes back
/// online by itself. The client must notice the suspension and recover.
pub struct DisconnectAndSuspend {
    layer: TransportLayer,
    suspend_delay: Duration,
    timer: RestartTimer,
}

impl DisconnectAndSuspend {
    pub fn new(id: &str, proxy: Arc<dyn TransportProxy>) -> Self {
        Self::with_delay(id, proxy, SUSPEND_DELAY)
    }

    pub fn with_delay(id: &str, proxy: Arc<dyn TransportProxy>, suspend_delay: Duration) -> Self {
        DisconnectAndSuspend {
            layer: TransportLayer::new(id, proxy),
            suspend_delay,
            timer: RestartTimer::new(),
        }
    }

    pub fn restart_pending(&self) -> bool {
        self.timer.is_pending()
    }
}

impl FaultSimulation for DisconnectAndSuspend {
    fn id(&self) -> &str {
        &self.layer.id
    }

    fn name(&self) -> &'static str {
        catalog::transport::DISCONNECT_AND_SUSPEND
    }

    fn fault_type(&self) -> FaultType {
        FaultType::nonfatal(Duration::from_secs(180))
    }

    fn proxy(&self) -> ProxyHandle {
        self.layer.handle()
    }

    fn enable(&self) -> Result<(), FaultError> {
        info!(
            fault = self.name(),
            id = %self.layer.id,
            delay_ms = self.suspend_delay.as_millis() as u64,
            "Suspending proxy"
        );
        self.layer.proxy.stop();

        let proxy = self.layer.proxy.clone();
        let id = self.layer.id.clone();
        self.timer.schedule(self.suspend_delay, move || {
            info!(id = %id, "Suspend delay elapsed, restarting proxy");
            if let Err(e) = proxy.start() {
                warn!(id = %id, "Failed to restart proxy: {}", e);
            }
        })
    }

    fn resolve(&self) -> Result<(), FaultError> {
        self.timer.cancel();
        self.layer.proxy.start()?;
        Ok(())
    }

    fn clean_up(&self) {
        self.timer.cancel();
        self.layer.proxy.stop();
    }
}
