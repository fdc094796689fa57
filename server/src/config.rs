use crate::client_log::DEFAULT_CLIENT_LOG;
use crate::registry::{EvictionPolicy, IdleTimeout, NeverEvict, SendFailureLimit};
use shared::DEFAULT_PORT;
use std::path::PathBuf;
use std::time::Duration;

/// How departed players are removed from the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionConfig {
    #[default]
    Never,
    IdleTimeout(Duration),
    SendFailures(u32),
}

impl EvictionConfig {
    pub fn policy(self) -> Box<dyn EvictionPolicy> {
        match self {
            EvictionConfig::Never => Box::new(NeverEvict),
            EvictionConfig::IdleTimeout(timeout) => Box::new(IdleTimeout(timeout)),
            EvictionConfig::SendFailures(limit) => Box::new(SendFailureLimit(limit)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `None` disables the bookkeeping file
    pub client_log: Option<PathBuf>,
    /// Delay between waking up and draining the queue, so updates of one
    /// burst can be ordered together. Zero drains immediately.
    pub reorder_window: Duration,
    pub eviction: EvictionConfig,
    pub eviction_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            client_log: Some(PathBuf::from(DEFAULT_CLIENT_LOG)),
            reorder_window: Duration::ZERO,
            eviction: EvictionConfig::Never,
            eviction_interval: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
