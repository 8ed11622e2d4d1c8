use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;
use tracing::{info, warn};

use switchyard_core::remote::RemoteToolClient;
use switchyard_gateway::bus::{MemoryBus, MessageBus, RedisBus};
use switchyard_gateway::shutdown::wait_for_signal;
use switchyard_gateway::{BusKind, GatewayConfig, GatewayState};
use switchyard_llm::{OllamaProvider, OpenAiProvider, ProviderRegistry};
use switchyard_telemetry::{parse_level, LogFormat, TelemetryConfig};
use switchyard_tools::mcp::{McpRemoteClient, McpServersConfig};
use switchyard_tools::{register_builtins, ToolRegistry};

/// WebSocket JSON-RPC gateway with topic pub/sub and tool dispatch.
#[derive(Parser, Debug)]
#[command(name = "switchyard", version, about)]
struct Cli {
    #[arg(long, env = "SWITCHYARD_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "SWITCHYARD_PORT", default_value_t = 13030)]
    port: u16,

    /// Outbound frames buffered per connection.
    #[arg(long, env = "SWITCHYARD_SEND_QUEUE", default_value_t = 256)]
    send_queue_size: usize,

    /// Concurrent blocking handlers.
    #[arg(long, env = "SWITCHYARD_WORKERS", default_value_t = 8)]
    worker_threads: usize,

    /// `memory` or `redis`.
    #[arg(long, env = "SWITCHYARD_BUS", default_value = "memory")]
    bus: BusKind,

    #[arg(long, env = "SWITCHYARD_REDIS_URL", default_value = "redis://localhost:13379/0")]
    redis_url: String,

    #[arg(long, env = "SWITCHYARD_MCP_CONFIG", default_value = "data/mcpservers.json")]
    mcp_config: PathBuf,

    #[arg(long, env = "SWITCHYARD_DEFAULT_MODEL", default_value = "ollama:mistral:latest")]
    default_model: String,

    #[arg(long, env = "SWITCHYARD_OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    #[arg(long, env = "SWITCHYARD_OPENAI_URL", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "SWITCHYARD_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Per-module override, e.g. `switchyard_gateway=debug`. Repeatable.
    #[arg(long = "log-module", env = "SWITCHYARD_LOG_MODULES", value_delimiter = ',')]
    log_modules: Vec<String>,

    #[arg(long, env = "SWITCHYARD_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,
}

impl Cli {
    fn telemetry(&self) -> anyhow::Result<TelemetryConfig> {
        let mut module_levels = Vec::new();
        for entry in &self.log_modules {
            let (module, level) = entry
                .split_once('=')
                .with_context(|| format!("expected module=level, got '{entry}'"))?;
            module_levels.push((module.trim().to_string(), parse_level(level)?));
        }
        Ok(TelemetryConfig {
            log_level: parse_level(&self.log_level)?,
            module_levels,
            format: self.log_format,
        })
    }

    fn gateway(self) -> GatewayConfig {
        GatewayConfig {
            host: self.host,
            port: self.port,
            send_queue_size: self.send_queue_size,
            worker_threads: self.worker_threads,
            bus: self.bus,
            redis_url: self.redis_url,
            mcp_config_path: self.mcp_config,
            default_model: self.default_model,
            ollama_url: self.ollama_url,
            openai_base_url: self.openai_base_url,
            openai_api_key: self.openai_api_key.map(SecretString::from),
            ..Default::default()
        }
    }
}

fn build_providers(config: &GatewayConfig) -> ProviderRegistry {
    ProviderRegistry::new(config.default_model.clone())
        .with_provider(Arc::new(OllamaProvider::new(config.ollama_url.clone())))
        .with_provider(Arc::new(OpenAiProvider::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
        )))
}

async fn build_tools(config: &GatewayConfig) -> anyhow::Result<ToolRegistry> {
    let servers = McpServersConfig::load(&config.mcp_config_path)?;
    let remote = Arc::new(McpRemoteClient::new(servers));
    let tools = ToolRegistry::with_remote(remote.clone());
    register_builtins(&tools)?;

    for server in remote.server_ids() {
        match tools.discover(&server).await {
            Ok(names) => info!(server = %server, count = names.len(), "remote tools registered"),
            Err(e) => warn!(server = %server, error = %e, "tool discovery failed"),
        }
    }
    Ok(tools)
}

fn build_bus(config: &GatewayConfig) -> anyhow::Result<Arc<dyn MessageBus>> {
    Ok(match config.bus {
        BusKind::Memory => Arc::new(MemoryBus::new()),
        BusKind::Redis => Arc::new(RedisBus::new(&config.redis_url)?),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    switchyard_telemetry::init_telemetry(&cli.telemetry()?)?;
    let config = cli.gateway();

    info!(version = env!("CARGO_PKG_VERSION"), bus = ?config.bus, "starting switchyard");

    let provider = Arc::new(build_providers(&config));
    let tools = Arc::new(build_tools(&config).await?);
    let bus = build_bus(&config)?;

    let state = Arc::new(GatewayState::new(config, bus, tools, provider));
    let server = switchyard_gateway::start(state).await?;
    info!(addr = %server.addr(), "ready");

    wait_for_signal().await;
    server.shutdown(None).await;
    Ok(())
}
