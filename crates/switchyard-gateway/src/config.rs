//! Gateway configuration.

use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Which message bus backs cross-process pub/sub.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// In-process only; topics are not shared between gateway instances.
    #[default]
    Memory,
    Redis,
}

impl FromStr for BusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown bus kind '{other}' (expected memory or redis)")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    /// `0` picks a free port.
    pub port: u16,
    /// Outbound frames buffered per connection before sends start failing.
    pub send_queue_size: usize,
    /// Concurrent blocking handlers.
    pub worker_threads: usize,
    pub bus: BusKind,
    pub redis_url: String,
    pub bus_poll_interval_ms: u64,
    pub bus_reconnect_backoff_ms: u64,
    pub mcp_config_path: PathBuf,
    pub default_model: String,
    pub ollama_url: String,
    pub openai_base_url: String,
    #[serde(skip)]
    pub openai_api_key: Option<SecretString>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 13030,
            send_queue_size: 256,
            worker_threads: 8,
            bus: BusKind::Memory,
            redis_url: "redis://localhost:13379/0".into(),
            bus_poll_interval_ms: 1000,
            bus_reconnect_backoff_ms: 1000,
            mcp_config_path: PathBuf::from("data/mcpservers.json"),
            default_model: "ollama:mistral:latest".into(),
            ollama_url: "http://localhost:11434".into(),
            openai_base_url: "https://api.openai.com/v1".into(),
            openai_api_key: None,
        }
    }
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
