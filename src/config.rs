use crate::faults::millis;
use crate::faults::presence_nack::DEFAULT_NACK_LIMIT;
use crate::faults::transport::SUSPEND_DELAY;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Error returned when configuration cannot be loaded
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Where the proxy listens and where it forwards to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub listen_host: String,
    /// 0 picks a free port on first start; restarts reuse it
    pub listen_port: u16,
    pub target_host: String,
    pub target_port: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            listen_host: "127.0.0.1".to_string(),
            listen_port: 13579,
            target_host: "realtime.ably.io".to_string(),
            target_port: 443,
        }
    }
}

impl ProxyConfig {
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    pub fn with_target(mut self, host: impl Into<String>, port: u16) -> Self {
        self.target_host = host.into();
        self.target_port = port;
        self
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    pub fn target_addr(&self) -> String {
        format!("{}:{}", self.target_host, self.target_port)
    }
}

/// Fault harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub proxy: ProxyConfig,
    /// How long DisconnectAndSuspend keeps the proxy down before restarting
    pub suspend_delay_ms: u64,
    /// NACKs injected by the presence NACK faults before passing through
    pub nack_limit: u32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            proxy: ProxyConfig::default(),
            suspend_delay_ms: millis(SUSPEND_DELAY),
            nack_limit: DEFAULT_NACK_LIMIT,
        }
    }
}

impl HarnessConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_suspend_delay(mut self, delay: Duration) -> Self {
        self.suspend_delay_ms = millis(delay);
        self
    }

    pub fn with_nack_limit(mut self, limit: u32) -> Self {
        self.nack_limit = limit;
        self
    }

    pub fn suspend_delay(&self) -> Duration {
        Duration::from_millis(self.suspend_delay_ms)
    }
}
