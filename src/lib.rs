pub mod config;
pub mod faults;
pub mod logging;
pub mod protocol;
pub mod proxy;

pub use config::{ConfigError, HarnessConfig, ProxyConfig};
pub use faults::{Fault, FaultError, FaultRegistry, FaultSimulation, FaultType};
pub use protocol::{Action, ConnectionParams, Frame, FrameDirection, Message};
pub use proxy::{
    ApplicationProxy, DefaultProxyFactory, Interceptor, Layer4Proxy, Layer7Proxy, ProxyError,
    ProxyFactory, ProxyHandle, TransportProxy,
};
