//! Fault Proxy
//!
//! Runs one fault simulation in front of a realtime endpoint so a client
//! under test can be pointed at it by hand.
//!
//!   fault-proxy list
//!   fault-proxy run <fault> [config.toml]

use realtime_faults::logging::{init_tracing, LogFormat};
use realtime_faults::{FaultRegistry, HarnessConfig, ProxyHandle};
use tokio::signal;
use tracing::{info, warn};

const USAGE: &str = "usage: fault-proxy list | fault-proxy run <fault> [config.toml]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing(LogFormat::from_env())?;

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("list") => list(),
        Some("run") => {
            let name = args.get(2).ok_or(USAGE)?;
            let config = match args.get(3) {
                Some(path) => HarnessConfig::from_file(path)?,
                None => HarnessConfig::default(),
            };
            run(name, config).await
        }
        _ => Err(USAGE.into()),
    }
}

fn list() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = FaultRegistry::with_defaults(HarnessConfig::default());
    for fault in registry.iter() {
        let simulation = fault.simulate("list");
        println!("{:<32} {}", fault.name(), serde_json::to_string(&simulation.fault_type())?);
    }
    Ok(())
}

async fn run(name: &str, config: HarnessConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listen = config.proxy.listen_addr();
    let target = config.proxy.target_addr();
    let registry = FaultRegistry::with_defaults(config);
    let simulation = registry
        .simulate(name, "fault-proxy")
        .ok_or_else(|| format!("unknown fault '{}'; try `fault-proxy list`", name))?;

    let proxy = simulation.proxy();
    if let ProxyHandle::Application(_) = &proxy {
        warn!(fault = name, "Application-layer faults need a WebSocket front end feeding the interceptor");
    }
    proxy.start()?;
    simulation.enable()?;
    info!(
        fault = name,
        listen = %listen,
        upstream = %target,
        fault_type = ?simulation.fault_type(),
        "Fault enabled, press Ctrl-C to resolve and exit"
    );

    signal::ctrl_c().await?;

    info!(fault = name, "Shutting down");
    if let Err(e) = simulation.resolve() {
        warn!(fault = name, "Resolve failed during shutdown: {}", e);
    }
    simulation.clean_up();
    Ok(())
}
