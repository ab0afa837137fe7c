//! Name-keyed registry of every fault the harness can simulate

use super::catalog::{application, transport};
use super::{
    DisconnectAndSuspend, DisconnectWithFailedResume, DropAction, Fault, FaultSimulation,
    NullApplicationLayerFault, NullTransportFault, PresenceNack, ReenterOnResumeFailed,
    SimulationBuilder, TcpConnectionRefused, TcpConnectionUnresponsive, UnresponsiveAfterAction,
};
use crate::config::HarnessConfig;
use crate::proxy::{DefaultProxyFactory, ProxyFactory};
use std::collections::BTreeMap;
use std::sync::Arc;

fn null_transport(id: &str, factory: &dyn ProxyFactory, _: &HarnessConfig) -> Box<dyn FaultSimulation> {
    Box::new(NullTransportFault::new(id, factory.transport_proxy(id)))
}

fn connection_refused(id: &str, factory: &dyn ProxyFactory, _: &HarnessConfig) -> Box<dyn FaultSimulation> {
    Box::new(TcpConnectionRefused::new(id, factory.transport_proxy(id)))
}

fn connection_unresponsive(id: &str, factory: &dyn ProxyFactory, _: &HarnessConfig) -> Box<dyn FaultSimulation> {
    Box::new(TcpConnectionUnresponsive::new(id, factory.transport_proxy(id)))
}

fn disconnect_and_suspend(id: &str, factory: &dyn ProxyFactory, config: &HarnessConfig) -> Box<dyn FaultSimulation> {
    Box::new(DisconnectAndSuspend::with_delay(
        id,
        factory.transport_proxy(id),
        config.suspend_delay(),
    ))
}

fn null_application(id: &str, factory: &dyn ProxyFactory, _: &HarnessConfig) -> Box<dyn FaultSimulation> {
    Box::new(NullApplicationLayerFault::create(id, factory.application_proxy(id)))
}

fn attach_unresponsive(id: &str, factory: &dyn ProxyFactory, _: &HarnessConfig) -> Box<dyn FaultSimulation> {
    Box::new(DropAction::attach_unresponsive(id, factory.application_proxy(id)))
}

fn detach_unresponsive(id: &str, factory: &dyn ProxyFactory, _: &HarnessConfig) -> Box<dyn FaultSimulation> {
    Box::new(DropAction::detach_unresponsive(id, factory.application_proxy(id)))
}

fn enter_unresponsive(id: &str, factory: &dyn ProxyFactory, _: &HarnessConfig) -> Box<dyn FaultSimulation> {
    Box::new(UnresponsiveAfterAction::enter_unresponsive(id, factory.application_proxy(id)))
}

fn failed_resume(id: &str, factory: &dyn ProxyFactory, _: &HarnessConfig) -> Box<dyn FaultSimulation> {
    Box::new(DisconnectWithFailedResume::create(id, factory.application_proxy(id)))
}

fn enter_nack(id: &str, factory: &dyn ProxyFactory, config: &HarnessConfig) -> Box<dyn FaultSimulation> {
    Box::new(PresenceNack::enter_failed_with_nonfatal_nack(
        id,
        factory.application_proxy(id),
        config.nack_limit,
    ))
}

fn update_nack(id: &str, factory: &dyn ProxyFactory, config: &HarnessConfig) -> Box<dyn FaultSimulation> {
    Box::new(PresenceNack::update_failed_with_nonfatal_nack(
        id,
        factory.application_proxy(id),
        config.nack_limit,
    ))
}

fn reenter_on_resume_failed(id: &str, factory: &dyn ProxyFactory, _: &HarnessConfig) -> Box<dyn FaultSimulation> {
    Box::new(ReenterOnResumeFailed::create(id, factory.application_proxy(id)))
}

const BUILDERS: &[(&str, SimulationBuilder)] = &[
    (transport::NULL, null_transport),
    (transport::CONNECTION_REFUSED, connection_refused),
    (transport::CONNECTION_UNRESPONSIVE, connection_unresponsive),
    (transport::DISCONNECT_AND_SUSPEND, disconnect_and_suspend),
    (application::NULL, null_application),
    (application::ATTACH_UNRESPONSIVE, attach_unresponsive),
    (application::DETACH_UNRESPONSIVE, detach_unresponsive),
    (application::ENTER_UNRESPONSIVE, enter_unresponsive),
    (application::DISCONNECT_WITH_FAILED_RESUME, failed_resume),
    (application::ENTER_FAILED_WITH_NONFATAL_NACK, enter_nack),
    (application::UPDATE_FAILED_WITH_NONFATAL_NACK, update_nack),
    (application::REENTER_ON_RESUME_FAILED, reenter_on_resume_failed),
];

/// All registered faults, sharing one proxy factory and configuration
pub struct FaultRegistry {
    faults: BTreeMap<&'static str, Fault>,
}

impl FaultRegistry {
    pub fn new(factory: Arc<dyn ProxyFactory>, config: HarnessConfig) -> Self {
        let config = Arc::new(config);
        let faults = BUILDERS
            .iter()
            .map(|&(name, build)| (name, Fault::new(name, build, factory.clone(), config.clone())))
            .collect();
        FaultRegistry { faults }
    }

    /// Registry backed by real Layer 4 and Layer 7 proxies
    pub fn with_defaults(config: HarnessConfig) -> Self {
        let factory = Arc::new(DefaultProxyFactory::new(config.proxy.clone()));
        Self::new(factory, config)
    }

    pub fn get(&self, name: &str) -> Option<&Fault> {
        self.faults.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.faults.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fault> {
        self.faults.values()
    }

    pub fn len(&self) -> usize {
        self.faults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    /// Shorthand for `get(name)` followed by `simulate(id)`
    pub fn simulate(&self, name: &str, id: &str) -> Option<Box<dyn FaultSimulation>> {
        self.get(name).map(|fault| fault.simulate(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::catalog::ALL_FAULTS;
    use crate::faults::FaultType;
    use crate::proxy::ProxyHandle;
    use std::time::Duration;

    #[test]
    fn test_registers_every_catalogued_fault() {
        let registry = FaultRegistry::with_defaults(HarnessConfig::default());
        assert_eq!(registry.len(), ALL_FAULTS.len());
        for name in ALL_FAULTS {
            let fault = registry.get(name).unwrap();
            assert_eq!(fault.name(), *name);
        }
        assert!(registry.get("NoSuchFault").is_none());
        assert!(registry.simulate("NoSuchFault", "x").is_none());
    }

    #[test]
    fn test_simulations_match_their_layer() {
        let registry = FaultRegistry::with_defaults(HarnessConfig::default());
        for fault in registry.iter() {
            let sim = fault.simulate("layer");
            assert_eq!(sim.name(), fault.name());
            assert_eq!(sim.id(), "layer");
            assert!(!sim.proxy().is_running());
            let transport = matches!(sim.proxy(), ProxyHandle::Transport(_));
            assert_eq!(transport, is_transport(fault.name()));
        }
    }

    fn is_transport(name: &str) -> bool {
        [
            transport::NULL,
            transport::CONNECTION_REFUSED,
            transport::CONNECTION_UNRESPONSIVE,
            transport::DISCONNECT_AND_SUSPEND,
        ]
        .contains(&name)
    }

    #[test]
    fn test_simulate_builds_fresh_instances() {
        let registry = FaultRegistry::with_defaults(HarnessConfig::default());
        let a = registry.simulate(application::ATTACH_UNRESPONSIVE, "a").unwrap();
        let b = registry.simulate(application::ATTACH_UNRESPONSIVE, "b").unwrap();
        assert_eq!(a.id(), "a");
        assert_eq!(b.id(), "b");
        a.clean_up();
        b.clean_up();
    }

    #[test]
    fn test_fault_types() {
        let registry = FaultRegistry::with_defaults(HarnessConfig::default());
        let type_of = |name| registry.simulate(name, "t").unwrap().fault_type();

        assert_eq!(
            type_of(transport::CONNECTION_REFUSED),
            FaultType::nonfatal_when_resolved(Duration::from_secs(30), Duration::from_secs(60))
        );
        assert_eq!(type_of(transport::DISCONNECT_AND_SUSPEND), FaultType::nonfatal(Duration::from_secs(180)));
        assert_eq!(type_of(application::ENTER_UNRESPONSIVE), FaultType::nonfatal(Duration::from_secs(150)));
        assert_eq!(
            type_of(application::DISCONNECT_WITH_FAILED_RESUME),
            FaultType::nonfatal(Duration::from_secs(30))
        );
        assert!(registry.iter().all(|f| !f.simulate("t").fault_type().is_fatal()));
    }
}
